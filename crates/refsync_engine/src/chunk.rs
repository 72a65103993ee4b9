//! Splitting content streams into bounded chunks.

use bytes::Bytes;
use std::io::{self, ErrorKind, Read};

/// Reads the next chunk of at most `max_size` bytes from `reader`.
///
/// The returned chunk is shorter than `max_size` only when the stream ends
/// mid-read. An empty result means the stream is exhausted; calling again
/// keeps returning empty results. Read failures are returned as errors, never
/// folded into the end-of-stream sentinel.
///
/// # Errors
///
/// Returns any error from the underlying reader other than `Interrupted`.
pub fn next_chunk<R: Read + ?Sized>(reader: &mut R, max_size: usize) -> io::Result<Vec<u8>> {
    // Grows with the data instead of reserving `max_size` up front
    let mut buf = Vec::new();
    Read::take(&mut *reader, max_size as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Fills `buf` from `reader` until it is full or the stream ends.
///
/// Returns the number of bytes read; 0 means the stream is exhausted.
///
/// # Errors
///
/// Returns any error from the underlying reader other than `Interrupted`.
pub fn fill_chunk<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// Lazy iterator over the non-empty chunks of a stream.
///
/// Reads into one reusable buffer of `max_size` bytes, allocated on the
/// first read, and copies each chunk out at its exact length. Ends after the
/// end-of-stream sentinel or after the first read error.
///
/// # Example
///
/// ```rust
/// use refsync_engine::ChunkReader;
///
/// let data = vec![7u8; 10];
/// let chunks: Vec<_> = ChunkReader::new(&data[..], 4)
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
/// ```
pub struct ChunkReader<R> {
    reader: R,
    max_size: usize,
    buf: Vec<u8>,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Creates a chunk iterator over `reader`.
    pub fn new(reader: R, max_size: usize) -> Self {
        Self {
            reader,
            max_size,
            buf: Vec::new(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.buf.len() != self.max_size {
            self.buf.resize(self.max_size, 0);
        }

        match fill_chunk(&mut self.reader, &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => Some(Ok(Bytes::copy_from_slice(&self.buf[..n]))),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CHUNK: usize = 1024;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::ConnectionReset, "boom"))
        }
    }

    /// Yields one byte per read, with an interruption before each.
    struct TrickleReader {
        data: Vec<u8>,
        pos: usize,
        interrupt: bool,
    }

    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(ErrorKind::Interrupted, "again"));
            }
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn end_of_stream() {
        let mut empty: &[u8] = &[];
        assert!(next_chunk(&mut empty, CHUNK).unwrap().is_empty());
        assert!(next_chunk(&mut io::empty(), CHUNK).unwrap().is_empty());
    }

    #[test]
    fn less_than_chunk_size() {
        let mut reader: &[u8] = &[1, 2, 3, 4];
        assert_eq!(next_chunk(&mut reader, CHUNK).unwrap(), vec![1, 2, 3, 4]);
        assert!(next_chunk(&mut reader, CHUNK).unwrap().is_empty());
    }

    #[test]
    fn exactly_chunk_size() {
        let data = pattern(CHUNK);
        let mut reader = &data[..];
        assert_eq!(next_chunk(&mut reader, CHUNK).unwrap(), data);
        assert!(next_chunk(&mut reader, CHUNK).unwrap().is_empty());
    }

    #[test]
    fn more_than_chunk_size() {
        let data = pattern(CHUNK * 2);
        let mut reader = &data[..];
        assert_eq!(next_chunk(&mut reader, CHUNK).unwrap(), &data[..CHUNK]);
        assert_eq!(next_chunk(&mut reader, CHUNK).unwrap(), &data[CHUNK..]);
        assert!(next_chunk(&mut reader, CHUNK).unwrap().is_empty());
        // Sentinel repeats
        assert!(next_chunk(&mut reader, CHUNK).unwrap().is_empty());
    }

    #[test]
    fn rethrows_read_error() {
        let err = next_chunk(&mut FailingReader, CHUNK).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
    }

    #[test]
    fn short_reads_fill_whole_chunk() {
        let mut reader = TrickleReader {
            data: pattern(10),
            pos: 0,
            interrupt: false,
        };
        assert_eq!(next_chunk(&mut reader, 4).unwrap(), pattern(4));
        assert_eq!(next_chunk(&mut reader, 4).unwrap(), &pattern(10)[4..8]);
        assert_eq!(next_chunk(&mut reader, 4).unwrap(), &pattern(10)[8..]);
        assert!(next_chunk(&mut reader, 4).unwrap().is_empty());
    }

    #[test]
    fn fill_chunk_reuses_buffer() {
        let data = pattern(10);
        let mut reader = &data[..];
        let mut buf = [0u8; 4];

        assert_eq!(fill_chunk(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(fill_chunk(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(fill_chunk(&mut reader, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[8, 9]);
        assert_eq!(fill_chunk(&mut reader, &mut buf).unwrap(), 0);
    }

    #[test]
    fn large_chunk_size_does_not_preallocate() {
        // A small stream under a huge limit yields exactly its bytes
        let mut reader: &[u8] = &[1, 2, 3];
        let chunk = next_chunk(&mut reader, usize::MAX).unwrap();
        assert_eq!(chunk, vec![1, 2, 3]);
        assert!(chunk.capacity() < 1024 * 1024);
    }

    #[test]
    fn reader_chunks_are_independent() {
        let data = pattern(10);
        let chunks: Vec<Bytes> = ChunkReader::new(&data[..], 4)
            .collect::<io::Result<_>>()
            .unwrap();

        // Reusing the read buffer must not alias earlier chunks
        assert_eq!(chunks[0].as_ref(), &data[..4]);
        assert_eq!(chunks[1].as_ref(), &data[4..8]);
        assert_eq!(chunks[2].as_ref(), &data[8..]);
    }

    #[test]
    fn reader_trickle_and_interrupts() {
        let reader = TrickleReader {
            data: pattern(10),
            pos: 0,
            interrupt: false,
        };
        let sizes: Vec<usize> = ChunkReader::new(reader, 4).map(|c| c.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn reader_stops_after_error() {
        let mut chunks = ChunkReader::new(FailingReader, CHUNK);
        assert!(chunks.next().unwrap().is_err());
        assert!(chunks.next().is_none());
    }

    proptest! {
        #[test]
        fn chunks_reconstruct_stream(data in proptest::collection::vec(any::<u8>(), 0..4096), size in 1usize..600) {
            let chunks: Vec<Bytes> = ChunkReader::new(&data[..], size)
                .collect::<io::Result<_>>()
                .unwrap();

            let expected_count = data.len().div_ceil(size);
            prop_assert_eq!(chunks.len(), expected_count);
            if let Some((last, full)) = chunks.split_last() {
                prop_assert!(full.iter().all(|c| c.len() == size));
                prop_assert!(!last.is_empty() && last.len() <= size);
            }
            prop_assert_eq!(chunks.concat(), data);
        }
    }
}

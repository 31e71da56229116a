use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads a stream in fixed-size chunks.
///
/// Every chunk except the last is exactly `chunk_size` bytes; short reads
/// from the underlying source are coalesced.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    offset: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `reader`. A `chunk_size` of 0 is treated as 1.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            offset: 0,
        }
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.offset += filled as u64;
        Ok(Some(buf.freeze()))
    }

    /// Bytes read so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_fixed_size_chunks() {
        let data = b"AABBCCDDEE";
        let mut reader = ChunkReader::new(&data[..], 4);

        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"AABB");
        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"CCDD");
        assert_eq!(reader.offset(), 8);
        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"EE");
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.offset(), 10);
    }

    #[tokio::test]
    async fn empty_source_yields_nothing() {
        let mut reader = ChunkReader::new(&b""[..], 16);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn coalesces_short_reads() {
        let source = chained_source();
        let mut reader = ChunkReader::new(source, 8);
        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"abcdefgh");
        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"ij");
    }

    fn chained_source() -> impl AsyncRead + Unpin {
        (&b"abc"[..]).chain(&b"def"[..]).chain(&b"ghij"[..])
    }

    #[tokio::test]
    async fn reads_real_file() {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();

        let handle = tokio::fs::File::open(file.path()).await.unwrap();
        let mut reader = ChunkReader::new(handle, 16 * 1024);
        let mut out = Vec::new();
        let mut sizes = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
            out.extend_from_slice(&chunk);
        }
        assert_eq!(sizes, vec![16384, 16384, 7232]);
        assert_eq!(out, data);
    }
}

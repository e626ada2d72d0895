//! Helper functions

use cookie_factory::{gen, SerializeFn};
use std::io::{Cursor, Seek as IoSeek, SeekFrom, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// A growable byte buffer that implements `cookie_factory::Seek`.
///
/// `cookie_factory` only implements its `Seek` marker trait for
/// `Cursor<&mut [u8]>`, not `Cursor<Vec<u8>>`, even though the latter
/// already satisfies the underlying `Write`/`io::Seek` bounds. This
/// newtype exists solely to provide that marker impl (the orphan rule
/// blocks implementing a foreign trait for a foreign type directly) so
/// serializers built with combinators like `back_to_the_buffer` can be
/// driven into a fresh, growable buffer.
pub(crate) struct GrowableBuf(Cursor<Vec<u8>>);

impl Write for GrowableBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl IoSeek for GrowableBuf {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}

impl cookie_factory::Seek for GrowableBuf {}

/// Drive a serializer into a fresh buffer.
///
/// Panics if the serializer itself fails; writing into a growable buffer
/// cannot run out of space.
pub fn serialize<S>(serializer: S) -> Vec<u8>
where
    S: SerializeFn<GrowableBuf>,
{
    let (w, len) =
        gen(serializer, GrowableBuf(Cursor::new(Vec::new()))).expect("serialization failed");
    let mut buf = w.0.into_inner();
    buf.truncate(len as usize);
    buf
}

/// Whole seconds since the Unix epoch.
pub fn seconds_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use cookie_factory::{bytes::be_u8, multi::many_ref};

    use super::*;

    #[test]
    fn serialize_truncates_to_written_length() {
        let data = [1u8, 2, 3, 4, 5];
        let buf = serialize(many_ref(&data, |b| be_u8(*b)));
        assert_eq!(buf, vec![1, 2, 3, 4, 5]);
    }
}

use crate::binary_image::BinaryImage;
use crate::error::{ReadError, ReadResult};

pub trait Pod: Sized + Copy {
    const SIZE: usize;
    fn from_le_bytes(bytes: &[u8]) -> Self;
}

macro_rules! impl_pod {
    ($t:ty) => {
        impl Pod for $t {
            const SIZE: usize = std::mem::size_of::<$t>();
            fn from_le_bytes(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(buf)
            }
        }
    };
}

impl_pod!(u8);
impl_pod!(u16);
impl_pod!(u32);
impl_pod!(u64);
impl_pod!(i8);
impl_pod!(i16);
impl_pod!(i32);
impl_pod!(i64);

pub struct StreamCursor<'a> {
    image: &'a BinaryImage,
    pos: u64,
}

impl<'a> StreamCursor<'a> {
    pub fn new(image: &'a BinaryImage, pos: u64) -> Self {
        StreamCursor { image, pos }
    }

    pub fn image(&self) -> &'a BinaryImage {
        self.image
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn set_pos(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn peek<T: Pod>(&self, offset: Option<u64>) -> ReadResult<T> {
        let addr = offset.unwrap_or(self.pos);
        let bytes = self.image.read_at(addr, T::SIZE as u64)?;
        if bytes.len() < T::SIZE {
            return Err(ReadError::ShortRead);
        }
        Ok(T::from_le_bytes(bytes))
    }

    pub fn read<T: Pod>(&mut self) -> ReadResult<T> {
        let value = self.peek::<T>(None)?;
        self.pos += T::SIZE as u64;
        Ok(value)
    }

    pub fn peek_cstring_at(&self, vaddr: u64) -> ReadResult<String> {
        self.image.read_cstring_at(vaddr)
    }

    pub fn scoped_seek(&mut self, pos: u64) -> ScopedSeek<'_, 'a> {
        let saved = self.pos;
        self.pos = pos;
        ScopedSeek { cursor: self, saved }
    }
}

pub struct ScopedSeek<'c, 'a> {
    cursor: &'c mut StreamCursor<'a>,
    saved: u64,
}

impl<'c, 'a> std::ops::Deref for ScopedSeek<'c, 'a> {
    type Target = StreamCursor<'a>;
    fn deref(&self) -> &Self::Target {
        self.cursor
    }
}

impl<'c, 'a> std::ops::DerefMut for ScopedSeek<'c, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cursor
    }
}

impl<'c, 'a> Drop for ScopedSeek<'c, 'a> {
    fn drop(&mut self) {
        self.cursor.pos = self.saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_image::BinaryImage;

    fn thin_text_image() -> BinaryImage {
        crate::binary_image::single_segment_image(
            "__TEXT",
            0x1000,
            b"\x2a\x00\x00\x00hello\0".to_vec(),
        )
    }

    #[test]
    fn read_advances_and_peek_does_not() {
        let image = thin_text_image();
        let mut cursor = StreamCursor::new(&image, 0x1000);
        let v: u32 = cursor.peek(None).unwrap();
        assert_eq!(v, 0x2a);
        assert_eq!(cursor.pos(), 0x1000);

        let v: u32 = cursor.read().unwrap();
        assert_eq!(v, 0x2a);
        assert_eq!(cursor.pos(), 0x1004);
    }

    #[test]
    fn cstring_reads_up_to_nul() {
        let image = thin_text_image();
        let cursor = StreamCursor::new(&image, 0x1000);
        let s = cursor.peek_cstring_at(0x1004).unwrap();
        assert_eq!(s, "hello");
    }

    #[test]
    fn scoped_seek_restores_position_on_drop() {
        let image = thin_text_image();
        let mut cursor = StreamCursor::new(&image, 0x1000);
        {
            let mut scoped = cursor.scoped_seek(0x1004);
            assert_eq!(scoped.pos(), 0x1004);
            let _: ReadResult<u8> = scoped.read();
        }
        assert_eq!(cursor.pos(), 0x1000);
    }

    #[test]
    fn out_of_range_read_is_reported() {
        let image = thin_text_image();
        let cursor = StreamCursor::new(&image, 0x1000);
        let err = cursor.peek::<u64>(Some(0x5000)).unwrap_err();
        assert_eq!(err, ReadError::Unmapped);
    }
}

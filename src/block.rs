//! Fixed-layout block primitives.
//!
//! Every block starts with a little-endian `u16` tag.  Two families exist:
//!
//! * **simple** blocks: the payload follows the tag directly, fixed size;
//! * **meta** blocks: two reserved bytes follow the tag (sometimes carrying a
//!   16-bit value), then the payload.  The whole block, measured from the
//!   tag, is zero-padded to a 4-byte boundary with [`padded`].
//!
//! Readers are called by the decode loop *after* it consumed the tag, so meta
//! readers back up two bytes to find the block start.  Writers emit the
//! complete block, tag included.  Neither side knows which tag means what;
//! that lives in [`crate::tag`].

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Round `n` up to the next multiple of 4.
#[inline]
pub const fn padded(n: usize) -> usize {
    (n + 3) & !3
}

// ── Fixed-point helpers ──────────────────────────────────────────────────────

/// Float in roughly [-1, 1] to signed 16-bit fixed point.  Saturates.
#[inline]
pub fn quantize_i16(v: f32) -> i16 {
    (v * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

#[inline]
pub fn dequantize_i16(v: i16) -> f32 {
    v as f32 / 32767.0
}

/// Float in [0, 1] to an 8-bit channel.  Saturates.
#[inline]
pub fn quantize_u8(c: f32) -> u8 {
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

#[inline]
pub fn dequantize_u8(c: u8) -> f32 {
    c as f32 / 255.0
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Block readers over a seekable source (in practice a `Cursor<&[u8]>` over
/// the decompressed stream).
pub trait ReadBlockExt: Read + Seek {
    fn read_tag(&mut self) -> io::Result<u16> {
        self.read_u16::<LittleEndian>()
    }

    /// Bytes up to and including a NUL, decoded as UTF-8.
    fn read_cstr(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                b => bytes.push(b),
            }
        }
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// NUL-terminated string padded to 4 bytes from its own start.
    fn read_cstr_aligned(&mut self) -> io::Result<String> {
        let start = self.stream_position()?;
        let s = self.read_cstr()?;
        self.align_from(start)?;
        Ok(s)
    }

    /// Seek to `start + padded(current - start)`.
    fn align_from(&mut self, start: u64) -> io::Result<()> {
        let here = self.stream_position()?;
        let len = padded((here - start) as usize) as u64;
        self.seek(SeekFrom::Start(start + len))?;
        Ok(())
    }

    /// Position of the tag that was just consumed.
    fn block_start(&mut self) -> io::Result<u64> {
        let here = self.stream_position()?;
        here.checked_sub(2)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no tag before cursor"))
    }

    /// Run `body` on the payload of a meta block (past the reserved bytes)
    /// and leave the cursor on the next block boundary.
    fn read_meta<T, F>(&mut self, body: F) -> io::Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> io::Result<T>,
    {
        let start = self.block_start()?;
        self.seek(SeekFrom::Start(start + 4))?;
        let value = body(self)?;
        self.align_from(start)?;
        Ok(value)
    }

    // ── simple scalars ──

    fn read_int16_block(&mut self) -> io::Result<i16> {
        self.read_i16::<LittleEndian>()
    }

    fn read_uint16_block(&mut self) -> io::Result<u16> {
        self.read_u16::<LittleEndian>()
    }

    // ── meta scalars / vectors ──

    fn read_int32_block(&mut self) -> io::Result<i32>
    where
        Self: Sized,
    {
        self.read_meta(|r| r.read_i32::<LittleEndian>())
    }

    fn read_float_block(&mut self) -> io::Result<f32>
    where
        Self: Sized,
    {
        self.read_meta(|r| r.read_f32::<LittleEndian>())
    }

    fn read_vec2_block(&mut self) -> io::Result<[f32; 2]>
    where
        Self: Sized,
    {
        self.read_meta(|r| read_floats::<_, 2>(r))
    }

    fn read_vec3_block(&mut self) -> io::Result<[f32; 3]>
    where
        Self: Sized,
    {
        self.read_meta(|r| read_floats::<_, 3>(r))
    }

    fn read_vec4_block(&mut self) -> io::Result<[f32; 4]>
    where
        Self: Sized,
    {
        self.read_meta(|r| read_floats::<_, 4>(r))
    }

    fn read_comment_block(&mut self) -> io::Result<String>
    where
        Self: Sized,
    {
        self.read_meta(|r| r.read_cstr())
    }

    /// `(index, parent, name)`
    fn read_bone_info_block(&mut self) -> io::Result<(i32, i32, String)>
    where
        Self: Sized,
    {
        self.read_meta(|r| {
            let index = r.read_i32::<LittleEndian>()?;
            let parent = r.read_i32::<LittleEndian>()?;
            Ok((index, parent, r.read_cstr()?))
        })
    }

    /// `(frame, string)`
    fn read_note_frame_block(&mut self) -> io::Result<(i32, String)>
    where
        Self: Sized,
    {
        self.read_meta(|r| {
            let frame = r.read_i32::<LittleEndian>()?;
            Ok((frame, r.read_cstr()?))
        })
    }

    // ── index-in-reserved-slot blocks ──

    /// Object / part info: int16 index in the reserved slot, then a name.
    fn read_object_info_block(&mut self) -> io::Result<(i16, String)> {
        let start = self.block_start()?;
        let index = self.read_i16::<LittleEndian>()?;
        let name = self.read_cstr()?;
        self.align_from(start)?;
        Ok((index, name))
    }

    /// `(index, name, type, image string)`
    fn read_material_info_block(&mut self) -> io::Result<(i16, String, String, String)> {
        let start = self.block_start()?;
        let index = self.read_i16::<LittleEndian>()?;
        let name = self.read_cstr_aligned()?;
        let kind = self.read_cstr_aligned()?;
        let images = self.read_cstr_aligned()?;
        self.align_from(start)?;
        Ok((index, name, kind, images))
    }

    // ── fixed simple blocks ──

    /// Three fixed-point shorts, each divided by 32767.
    fn read_short_vec3_block(&mut self) -> io::Result<[f32; 3]> {
        let mut out = [0.0; 3];
        for v in &mut out {
            *v = dequantize_i16(self.read_i16::<LittleEndian>()?);
        }
        Ok(out)
    }

    /// `(bone, weight)`.  The bone is stored as int16; indices above 32767
    /// are read back as their unsigned bit pattern.
    fn read_weight_block(&mut self) -> io::Result<(u16, f32)> {
        let bone = self.read_u16::<LittleEndian>()?;
        let weight = self.read_f32::<LittleEndian>()?;
        Ok((bone, weight))
    }

    /// `(mesh_id, material_id)` as bytes.
    fn read_triangle_block(&mut self) -> io::Result<(u16, u16)> {
        let mesh = self.read_u8()?;
        let material = self.read_u8()?;
        Ok((mesh as u16, material as u16))
    }

    /// `(mesh_id, material_id)` as shorts after a zero filler.
    fn read_triangle16_block(&mut self) -> io::Result<(u16, u16)> {
        self.seek(SeekFrom::Current(2))?;
        let mesh = self.read_u16::<LittleEndian>()?;
        let material = self.read_u16::<LittleEndian>()?;
        Ok((mesh, material))
    }

    fn read_color_block(&mut self) -> io::Result<[f32; 4]> {
        self.seek(SeekFrom::Current(2))?;
        let mut rgba = [0u8; 4];
        self.read_exact(&mut rgba)?;
        Ok(rgba.map(dequantize_u8))
    }

    /// The layer short is consumed and dropped; only one UV set is surfaced.
    fn read_uv_block(&mut self) -> io::Result<[f32; 2]> {
        let _layer = self.read_i16::<LittleEndian>()?;
        read_floats::<_, 2>(self)
    }
}

impl<R> ReadBlockExt for R where R: Read + Seek + ?Sized {}

fn read_floats<R: Read + ?Sized, const N: usize>(r: &mut R) -> io::Result<[f32; N]> {
    let mut out = [0.0; N];
    for v in &mut out {
        *v = r.read_f32::<LittleEndian>()?;
    }
    Ok(out)
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// Block writers.  Each call emits one complete block, tag first.
pub trait WriteBlockExt: Write {
    /// String, NUL, then zero padding up to `padded(len + 1)`.
    fn write_cstr_aligned(&mut self, s: &str) -> io::Result<()> {
        let bytes = s.as_bytes();
        self.write_all(bytes)?;
        let size = bytes.len() + 1;
        self.write_all(&ZEROS[..padded(size) - size + 1])
    }

    /// Tag with the reserved slot zeroed and no payload.
    fn write_marker_block(&mut self, tag: u16) -> io::Result<()> {
        self.write_int16_block(tag, 0)
    }

    fn write_int16_block(&mut self, tag: u16, value: i16) -> io::Result<()> {
        self.write_u16::<LittleEndian>(tag)?;
        self.write_i16::<LittleEndian>(value)
    }

    fn write_uint16_block(&mut self, tag: u16, value: u16) -> io::Result<()> {
        self.write_u16::<LittleEndian>(tag)?;
        self.write_u16::<LittleEndian>(value)
    }

    fn write_int32_block(&mut self, tag: u16, value: i32) -> io::Result<()> {
        self.write_meta_header(tag)?;
        self.write_i32::<LittleEndian>(value)
    }

    fn write_float_block(&mut self, tag: u16, value: f32) -> io::Result<()> {
        self.write_meta_header(tag)?;
        self.write_f32::<LittleEndian>(value)
    }

    fn write_vec2_block(&mut self, tag: u16, v: [f32; 2]) -> io::Result<()> {
        self.write_meta_header(tag)?;
        write_floats(self, &v)
    }

    fn write_vec3_block(&mut self, tag: u16, v: [f32; 3]) -> io::Result<()> {
        self.write_meta_header(tag)?;
        write_floats(self, &v)
    }

    fn write_vec4_block(&mut self, tag: u16, v: [f32; 4]) -> io::Result<()> {
        self.write_meta_header(tag)?;
        write_floats(self, &v)
    }

    fn write_comment_block(&mut self, tag: u16, comment: &str) -> io::Result<()> {
        self.write_meta_header(tag)?;
        write_cstr_block_tail(self, comment, 4)
    }

    fn write_bone_info_block(&mut self, tag: u16, index: i32, parent: i32, name: &str) -> io::Result<()> {
        self.write_meta_header(tag)?;
        self.write_i32::<LittleEndian>(index)?;
        self.write_i32::<LittleEndian>(parent)?;
        self.write_cstr_aligned(name)
    }

    fn write_note_frame_block(&mut self, tag: u16, frame: i32, string: &str) -> io::Result<()> {
        self.write_meta_header(tag)?;
        self.write_i32::<LittleEndian>(frame)?;
        write_cstr_block_tail(self, string, 8)
    }

    fn write_object_info_block(&mut self, tag: u16, index: i16, name: &str) -> io::Result<()> {
        self.write_int16_block(tag, index)?;
        self.write_cstr_aligned(name)
    }

    fn write_material_info_block(
        &mut self,
        tag:     u16,
        index:   i16,
        strings: [&str; 3],
    ) -> io::Result<()> {
        self.write_int16_block(tag, index)?;
        for s in strings {
            self.write_cstr_aligned(s)?;
        }
        Ok(())
    }

    fn write_short_vec3_block(&mut self, tag: u16, v: [f32; 3]) -> io::Result<()> {
        self.write_u16::<LittleEndian>(tag)?;
        for c in v {
            self.write_i16::<LittleEndian>(quantize_i16(c))?;
        }
        Ok(())
    }

    /// Rotation matrix as three short-vec3 rows, one tag per row.
    fn write_matrix_block(&mut self, row_tags: [u16; 3], m: &[[f32; 3]; 3]) -> io::Result<()> {
        for (tag, row) in row_tags.into_iter().zip(m) {
            self.write_short_vec3_block(tag, *row)?;
        }
        Ok(())
    }

    fn write_weight_block(&mut self, tag: u16, bone: u16, weight: f32) -> io::Result<()> {
        self.write_u16::<LittleEndian>(tag)?;
        self.write_u16::<LittleEndian>(bone)?;
        self.write_f32::<LittleEndian>(weight)
    }

    fn write_triangle_block(&mut self, tag: u16, mesh: u8, material: u8) -> io::Result<()> {
        self.write_u16::<LittleEndian>(tag)?;
        self.write_u8(mesh)?;
        self.write_u8(material)
    }

    fn write_triangle16_block(&mut self, tag: u16, mesh: u16, material: u16) -> io::Result<()> {
        self.write_meta_header(tag)?;
        self.write_u16::<LittleEndian>(mesh)?;
        self.write_u16::<LittleEndian>(material)
    }

    fn write_color_block(&mut self, tag: u16, rgba: [f32; 4]) -> io::Result<()> {
        self.write_meta_header(tag)?;
        self.write_all(&rgba.map(quantize_u8))
    }

    fn write_uv_block(&mut self, tag: u16, layer: i16, uv: [f32; 2]) -> io::Result<()> {
        self.write_u16::<LittleEndian>(tag)?;
        self.write_i16::<LittleEndian>(layer)?;
        write_floats(self, &uv)
    }

    fn write_meta_header(&mut self, tag: u16) -> io::Result<()> {
        self.write_u16::<LittleEndian>(tag)?;
        self.write_u16::<LittleEndian>(0)
    }
}

impl<W> WriteBlockExt for W where W: Write + ?Sized {}

const ZEROS: [u8; 4] = [0; 4];

fn write_floats<W: Write + ?Sized>(w: &mut W, v: &[f32]) -> io::Result<()> {
    for f in v {
        w.write_f32::<LittleEndian>(*f)?;
    }
    Ok(())
}

/// Trailing string of a meta block whose fixed part is `head` bytes long,
/// padding the whole block.
fn write_cstr_block_tail<W: Write + ?Sized>(w: &mut W, s: &str, head: usize) -> io::Result<()> {
    let bytes = s.as_bytes();
    w.write_all(bytes)?;
    let size = head + bytes.len() + 1;
    w.write_all(&ZEROS[..padded(size) - size + 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// Cursor over `bytes` with the leading tag already consumed.
    fn after_tag(bytes: &[u8]) -> Cursor<&[u8]> {
        let mut c = Cursor::new(bytes);
        c.set_position(2);
        c
    }

    #[test]
    fn padded_examples() {
        assert_eq!(padded(0), 0);
        assert_eq!(padded(1), 4);
        assert_eq!(padded(4), 4);
        assert_eq!(padded(5), 8);
    }

    #[test]
    fn aligned_string_pads_from_its_own_start() {
        let mut buf = Vec::new();
        buf.write_cstr_aligned("abc").unwrap();
        assert_eq!(buf, b"abc\0");
        buf.clear();
        buf.write_cstr_aligned("abcd").unwrap();
        assert_eq!(buf, b"abcd\0\0\0\0");

        let mut c = Cursor::new(&buf[..]);
        assert_eq!(c.read_cstr_aligned().unwrap(), "abcd");
        assert_eq!(c.position(), 8);
    }

    #[test]
    fn meta_vec3_layout() {
        let mut buf = Vec::new();
        buf.write_vec3_block(0x9383, [1.0, 2.0, 3.0]).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[..4], &[0x83, 0x93, 0, 0]);

        let mut c = after_tag(&buf);
        assert_eq!(c.read_vec3_block().unwrap(), [1.0, 2.0, 3.0]);
        assert_eq!(c.position(), 16);
    }

    #[test]
    fn comment_block_is_padded() {
        let mut buf = Vec::new();
        buf.write_comment_block(0xC355, "hello").unwrap();
        // 4 header + "hello\0" = 10 -> 12
        assert_eq!(buf.len(), 12);
        let mut c = after_tag(&buf);
        assert_eq!(c.read_comment_block().unwrap(), "hello");
        assert_eq!(c.position(), 12);
    }

    #[test]
    fn note_frame_block_is_padded() {
        let mut buf = Vec::new();
        buf.write_note_frame_block(0x1675, 12, "end").unwrap();
        // 8 header + "end\0" = 12
        assert_eq!(buf.len(), 12);
        buf.clear();
        buf.write_note_frame_block(0x1675, -4, "fire").unwrap();
        assert_eq!(buf.len(), 16);
        let mut c = after_tag(&buf);
        assert_eq!(c.read_note_frame_block().unwrap(), (-4, "fire".to_string()));
        assert_eq!(c.position(), 16);
    }

    #[test]
    fn bone_info_block() {
        let mut buf = Vec::new();
        buf.write_bone_info_block(0xF099, 3, -1, "tag_origin").unwrap();
        assert_eq!(buf.len() % 4, 0);
        let mut c = after_tag(&buf);
        assert_eq!(c.read_bone_info_block().unwrap(), (3, -1, "tag_origin".to_string()));
        assert_eq!(c.position() as usize, buf.len());
    }

    #[test]
    fn object_and_material_info_blocks() {
        let mut buf = Vec::new();
        buf.write_object_info_block(0x87D4, 2, "body").unwrap();
        let end = buf.len();
        buf.write_material_info_block(0xA700, 1, ["mtl", "lambert", "color:a.tga"]).unwrap();

        let mut c = after_tag(&buf);
        assert_eq!(c.read_object_info_block().unwrap(), (2, "body".to_string()));
        assert_eq!(c.position() as usize, end);
        c.set_position(end as u64 + 2);
        let (index, name, kind, images) = c.read_material_info_block().unwrap();
        assert_eq!((index, name.as_str(), kind.as_str(), images.as_str()), (1, "mtl", "lambert", "color:a.tga"));
        assert_eq!(c.position() as usize, buf.len());
    }

    #[test]
    fn short_vec3_quantizes_and_saturates() {
        let mut buf = Vec::new();
        buf.write_short_vec3_block(0x89EC, [1.0, -1.0, 4.0]).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[2..], &[0xFF, 0x7F, 0x01, 0x80, 0xFF, 0x7F]);
        let mut c = after_tag(&buf);
        assert_eq!(c.read_short_vec3_block().unwrap(), [1.0, -1.0, 1.0]);
    }

    #[test]
    fn simple_blocks_are_four_byte_multiples() {
        let mut buf = Vec::new();
        buf.write_weight_block(0xF1AB, 5, 0.25).unwrap();
        assert_eq!(buf.len(), 8);
        buf.write_triangle_block(0x562F, 1, 2).unwrap();
        assert_eq!(buf.len(), 12);
        buf.write_triangle16_block(0x6711, 300, 2).unwrap();
        assert_eq!(buf.len(), 20);
        buf.write_color_block(0x6DD8, [1.0, 0.5, 0.0, 2.0]).unwrap();
        assert_eq!(buf.len(), 28);
        buf.write_uv_block(0x1AD4, 1, [0.5, 0.75]).unwrap();
        assert_eq!(buf.len(), 40);

        let mut c = after_tag(&buf);
        assert_eq!(c.read_weight_block().unwrap(), (5, 0.25));
        c.set_position(10);
        assert_eq!(c.read_triangle_block().unwrap(), (1, 2));
        c.set_position(14);
        assert_eq!(c.read_triangle16_block().unwrap(), (300, 2));
        c.set_position(22);
        assert_eq!(c.read_color_block().unwrap(), [1.0, 128.0 / 255.0, 0.0, 1.0]);
        c.set_position(30);
        assert_eq!(c.read_uv_block().unwrap(), [0.5, 0.75]);
        assert_eq!(c.position(), 40);
    }

    #[test]
    fn missing_terminator_is_eof() {
        let mut c = Cursor::new(&b"abc"[..]);
        assert_eq!(c.read_cstr().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    proptest! {
        #[test]
        fn padded_is_smallest_multiple_of_four(n in 0usize..1 << 20) {
            let p = padded(n);
            prop_assert_eq!(p % 4, 0);
            prop_assert!(p >= n && p - n < 4);
        }

        #[test]
        fn i16_quantization_error_is_bounded(v in -1.0f32..=1.0) {
            let back = dequantize_i16(quantize_i16(v));
            prop_assert!((back - v).abs() <= 1.0 / 32767.0);
        }

        #[test]
        fn u8_quantization_error_is_bounded(c in 0.0f32..=1.0) {
            let back = dequantize_u8(quantize_u8(c));
            prop_assert!((back - c).abs() <= 1.0 / 255.0);
        }
    }
}

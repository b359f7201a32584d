use binread::BinRead;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 3 contiguous floats for encoding XYZ position or Euler rotation data.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Vector3 {
        Vector3 { x, y, z }
    }

    pub(crate) fn put<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)?;
        writer.write_f32::<LittleEndian>(self.z)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binread::BinReaderExt;
    use hexlit::hex;
    use std::io::Cursor;

    #[test]
    fn read_vector3() {
        let mut reader = Cursor::new(hex!("0000803F 000000C0 0000003F"));
        let value = reader.read_le::<Vector3>().unwrap();
        assert_eq!(1.0f32, value.x);
        assert_eq!(-2.0f32, value.y);
        assert_eq!(0.5f32, value.z);
    }

    #[test]
    fn put_vector3() {
        let mut writer = Cursor::new(Vec::new());
        Vector3::new(1.0, -2.0, 0.5).put(&mut writer).unwrap();
        assert_eq!(writer.get_ref().as_slice(), hex!("0000803F 000000C0 0000003F"));
    }
}

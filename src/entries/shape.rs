//! Region geometry variants.

use binread::{
    io::{Read, Seek},
    BinReaderExt,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MsbError;

/// Shape tags as stored in the region header.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ShapeType {
    Point = 0,
    Circle = 1,
    Sphere = 2,
    Cylinder = 3,
    Rect = 4,
    Box = 5,
    Composite = 6,
}

impl ShapeType {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Point),
            1 => Some(Self::Circle),
            2 => Some(Self::Sphere),
            3 => Some(Self::Cylinder),
            4 => Some(Self::Rect),
            5 => Some(Self::Box),
            6 => Some(Self::Composite),
            _ => None,
        }
    }
}

/// Region geometry. `Point` is the default and is represented on disk by
/// the absence of a shape data block.
///
/// The `Composite` variant's child region references live on the region
/// itself, not here, so the reference passes only ever walk entry state.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point,
    Circle { radius: f32 },
    Sphere { radius: f32 },
    Cylinder { radius: f32, height: f32 },
    Rect { width: f32, depth: f32 },
    Box { width: f32, depth: f32, height: f32 },
    Composite,
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Point
    }
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Point => ShapeType::Point,
            Shape::Circle { .. } => ShapeType::Circle,
            Shape::Sphere { .. } => ShapeType::Sphere,
            Shape::Cylinder { .. } => ShapeType::Cylinder,
            Shape::Rect { .. } => ShapeType::Rect,
            Shape::Box { .. } => ShapeType::Box,
            Shape::Composite => ShapeType::Composite,
        }
    }

    /// Reads the scalar shape data block. `Point` has no block and
    /// `Composite` blocks are read by the region itself.
    pub(crate) fn read_data<R: Read + Seek>(
        reader: &mut R,
        shape_type: ShapeType,
    ) -> Result<Shape, MsbError> {
        Ok(match shape_type {
            ShapeType::Point => Shape::Point,
            ShapeType::Circle => Shape::Circle {
                radius: reader.read_le::<f32>()?,
            },
            ShapeType::Sphere => Shape::Sphere {
                radius: reader.read_le::<f32>()?,
            },
            ShapeType::Cylinder => Shape::Cylinder {
                radius: reader.read_le::<f32>()?,
                height: reader.read_le::<f32>()?,
            },
            ShapeType::Rect => Shape::Rect {
                width: reader.read_le::<f32>()?,
                depth: reader.read_le::<f32>()?,
            },
            ShapeType::Box => Shape::Box {
                width: reader.read_le::<f32>()?,
                depth: reader.read_le::<f32>()?,
                height: reader.read_le::<f32>()?,
            },
            ShapeType::Composite => Shape::Composite,
        })
    }

    /// Writes the scalar shape data block.
    pub(crate) fn put_data<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Shape::Point | Shape::Composite => Ok(()),
            Shape::Circle { radius } | Shape::Sphere { radius } => {
                writer.write_f32::<LittleEndian>(*radius)
            }
            Shape::Cylinder { radius, height } => {
                writer.write_f32::<LittleEndian>(*radius)?;
                writer.write_f32::<LittleEndian>(*height)
            }
            Shape::Rect { width, depth } => {
                writer.write_f32::<LittleEndian>(*width)?;
                writer.write_f32::<LittleEndian>(*depth)
            }
            Shape::Box {
                width,
                depth,
                height,
            } => {
                writer.write_f32::<LittleEndian>(*width)?;
                writer.write_f32::<LittleEndian>(*depth)?;
                writer.write_f32::<LittleEndian>(*height)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;
    use std::io::Cursor;

    #[test]
    fn read_box_shape() {
        let mut reader = Cursor::new(hex!("0000803F 00000040 0000403F"));
        let shape = Shape::read_data(&mut reader, ShapeType::Box).unwrap();
        assert_eq!(
            Shape::Box {
                width: 1.0,
                depth: 2.0,
                height: 0.75
            },
            shape
        );
    }

    #[test]
    fn scalar_shapes_round_trip() {
        let shapes = [
            Shape::Circle { radius: 1.5 },
            Shape::Sphere { radius: 3.0 },
            Shape::Cylinder {
                radius: 2.0,
                height: 8.0,
            },
            Shape::Rect {
                width: 4.0,
                depth: 5.0,
            },
            Shape::Box {
                width: 1.0,
                depth: 2.0,
                height: 3.0,
            },
        ];
        for shape in shapes {
            let mut writer = Cursor::new(Vec::new());
            shape.put_data(&mut writer).unwrap();

            let mut reader = Cursor::new(writer.into_inner());
            let read_back = Shape::read_data(&mut reader, shape.shape_type()).unwrap();
            assert_eq!(shape, read_back);
        }
    }

    #[test]
    fn point_and_composite_have_no_scalar_data() {
        let mut writer = Cursor::new(Vec::new());
        Shape::Point.put_data(&mut writer).unwrap();
        Shape::Composite.put_data(&mut writer).unwrap();
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn unknown_shape_tag() {
        assert_eq!(None, ShapeType::from_raw(7));
    }
}

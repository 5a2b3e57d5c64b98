/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::{TensorError, Result};

use ::std::fmt;
use ::std::str::FromStr;

/// Element type of a tensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    Bool,
    UInt8,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    pub const ALL: [DType; 8] = [
        DType::Bool, DType::UInt8, DType::Int8, DType::Int16,
        DType::Int32, DType::Int64, DType::Float32, DType::Float64,
    ];

    /// Name used in error messages and serialized documents.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "torch.bool",
            DType::UInt8 => "torch.uint8",
            DType::Int8 => "torch.int8",
            DType::Int16 => "torch.int16",
            DType::Int32 => "torch.int32",
            DType::Int64 => "torch.int64",
            DType::Float32 => "torch.float32",
            DType::Float64 => "torch.float64",
        }
    }

    pub fn is_floating_point(self) -> bool {
        match self {
            DType::Float32 | DType::Float64 => true,
            _ => false,
        }
    }

    /// Whether values of this type may be implicitly converted to `to`.
    ///
    /// Floating point data never goes to integers or booleans, and only
    /// booleans go to booleans.
    pub fn can_cast(self, to: DType) -> bool {
        if self.is_floating_point() && !to.is_floating_point() {
            return false;
        }
        if self != DType::Bool && to == DType::Bool {
            return false;
        }
        true
    }

    /// Bring an integer into the range of this (integral) type, wrapping
    /// like an `as` cast does.
    pub(crate) fn wrap_int(self, x: i64) -> i64 {
        match self {
            DType::Bool => (x != 0) as i64,
            DType::UInt8 => x as u8 as i64,
            DType::Int8 => x as i8 as i64,
            DType::Int16 => x as i16 as i64,
            DType::Int32 => x as i32 as i64,
            DType::Int64 => x,
            DType::Float32 | DType::Float64 => x,
        }
    }

    /// Round a float to the precision of this (floating) type.
    pub(crate) fn round_float(self, x: f64) -> f64 {
        match self {
            DType::Float32 => x as f32 as f64,
            _ => x,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts the names produced by [`DType::name`], with or without the
/// `torch.` prefix.
impl FromStr for DType {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<DType> {
        let short = s.trim_start_matches("torch.");
        match short {
            "float" => return Ok(DType::Float32),
            "double" => return Ok(DType::Float64),
            "int" => return Ok(DType::Int32),
            "long" => return Ok(DType::Int64),
            _ => {},
        }
        DType::ALL.iter().cloned()
            .find(|dtype| dtype.name().trim_start_matches("torch.") == short)
            .ok_or_else(|| TensorError::UnknownDType(s.to_string()))
    }
}

/// Where the data of a tensor lives.
///
/// All data is kept in host memory; `Cuda` only tags a tensor so that mixing
/// devices is caught. `Meta` tensors have a shape and no data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda(usize),
    Meta,
}

impl Device {
    pub fn is_meta(self) -> bool { self == Device::Meta }
}

impl Default for Device {
    fn default() -> Self { Device::Cpu }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
            Device::Meta => write!(f, "meta"),
        }
    }
}

impl FromStr for Device {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Device> {
        match s {
            "cpu" => return Ok(Device::Cpu),
            "meta" => return Ok(Device::Meta),
            "cuda" => return Ok(Device::Cuda(0)),
            _ => {},
        }
        if let Some(index) = s.strip_prefix("cuda:") {
            if let Ok(index) = index.parse() {
                return Ok(Device::Cuda(index));
            }
        }
        Err(TensorError::UnknownDevice(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        for &dtype in &DType::ALL {
            assert_eq!(dtype.name().parse::<DType>().unwrap(), dtype);
        }
        assert_eq!("float64".parse::<DType>().unwrap(), DType::Float64);
        assert_eq!("double".parse::<DType>().unwrap(), DType::Float64);
        assert!("torch.complex64".parse::<DType>().is_err());

        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Cuda(1));
        assert_eq!(Device::Cuda(3).to_string(), "cuda:3");
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn casting_rules() {
        assert!(DType::Int64.can_cast(DType::Int32));
        assert!(DType::Bool.can_cast(DType::Int32));
        assert!(DType::Int32.can_cast(DType::Float64));
        assert!(!DType::Float32.can_cast(DType::Int32));
        assert!(!DType::Int32.can_cast(DType::Bool));
        assert!(DType::Bool.can_cast(DType::Bool));
    }

    #[test]
    fn wrapping() {
        assert_eq!(DType::Int8.wrap_int(200), -56);
        assert_eq!(DType::Bool.wrap_int(-3), 1);
        assert_eq!(DType::Float32.round_float(0.1), 0.1f32 as f64);
    }
}

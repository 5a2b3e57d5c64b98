/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Dense tensors tagged with an element type and a device, plus just enough
//! reverse-mode autodiff to register hand-written backward rules.
//!
//! Storage is always host memory. `Device::Cuda` is a tag (so that device
//! mismatches can be detected and reported), and `Device::Meta` tensors carry
//! a shape but no data at all.

#[macro_use] extern crate log;

pub use crate::dtype::{DType, Device};
pub use crate::errors::{TensorError, Result};
pub use crate::tensor::Tensor;
pub use crate::autograd::{AutogradContext, Function, apply};

mod dtype;
mod errors;
mod tensor;
mod autograd;
mod ops;

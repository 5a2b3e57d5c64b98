/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::{DType, Device};

pub type Result<T> = ::std::result::Result<T, TensorError>;

#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    #[error("expected {expected} values for a tensor of shape {shape:?}, got {actual}")]
    DataLength { shape: Vec<usize>, expected: usize, actual: usize },

    #[error("the number of elements in shape {0:?} does not fit in usize")]
    ShapeOverflow(Vec<usize>),

    #[error("shape mismatch: {0:?} and {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    #[error("{dtype} can not hold {what} data")]
    WrongPayload { dtype: DType, what: &'static str },

    #[error("unknown dtype name '{0}'")]
    UnknownDType(String),

    #[error("unknown device name '{0}'")]
    UnknownDevice(String),

    #[error("tensors on the meta device have no data ({0})")]
    MetaData(&'static str),

    #[error("can not copy data from a tensor on the meta device to {0}")]
    CopyOutOfMeta(Device),

    #[error("only floating point tensors can require gradients, got {0}")]
    NonFloatGrad(DType),

    #[error("can not change requires_grad of a tensor which is not a leaf of the graph")]
    NotALeaf,

    #[error("this tensor does not require grad and has no grad_fn")]
    NoGrad,

    #[error("the output of {0} is already part of a computational graph")]
    AlreadyInGraph(&'static str),

    #[error("gradient can only be implicitly created for tensors with a single element, got shape {0:?}")]
    ImplicitGradient(Vec<usize>),

    #[error("backward of {function}: {message}")]
    Backward { function: &'static str, message: String },
}

/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::tensor::TensorError;

pub type Result<T> = ::std::result::Result<T, Error>;

/// Everything that can go wrong while building, mutating, or (de)serializing
/// a system.
///
/// None of these are retried; the message names the offending field.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wrong number of dimensions, or wrong extent along an axis.
    #[error("{0}")]
    Shape(String),

    /// Operands disagree on dtype or device.
    #[error("{0}")]
    Mismatch(String),

    /// Labels of a block do not match what a neighbor list looks like.
    #[error("{0}")]
    Schema(String),

    /// Duplicate registration, missing key, or bad custom data name.
    #[error("{0}")]
    Registry(String),

    /// A neighbor pair disagrees with the positions and cell.
    #[error("{0}")]
    Consistency(String),

    /// Malformed or incomplete JSON document.
    #[error("{0}")]
    Format(String),

    #[error("unknown unit '{unit}' for {quantity}")]
    InvalidUnit { quantity: String, unit: String },

    #[error("unknown physical quantity '{0}'")]
    UnknownQuantity(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! The input side of a machine-learned interatomic potential.
//!
//! A [`System`] holds atomic types, positions, the periodic cell and its
//! periodicity, and lets an external engine attach neighbor lists (keyed by
//! [`NeighborListOptions`]) and other named data. Neighbor distances computed
//! by that engine can be spliced into the autograd graph with
//! [`register_autograd_neighbors`], and everything except custom data can be
//! stored as JSON and read back bit-for-bit.

#[macro_use] extern crate log;
#[macro_use] extern crate lazy_static;

pub extern crate mlsys_tensor as tensor;

// Early return with one of the string-carrying variants of `Error`.
macro_rules! throw {
    ($kind:ident, $($fmt:tt)+) => {
        return Err($crate::Error::$kind(format!($($fmt)+)));
    };
}

pub use crate::errors::{Error, Result};
pub use crate::labels::{Labels, TensorBlock};
pub use crate::options::NeighborListOptions;
pub use crate::system::System;
pub use crate::neighbors::{register_autograd_neighbors, neighbor_list_schema_check};
pub use crate::neighbors::{neighbor_list_block, NEIGHBOR_SAMPLE_NAMES};

pub mod units;

mod errors;
mod labels;
mod options;
mod system;
mod neighbors;
mod json;

/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Command line tools around [`mlsys_system`], and the logging setup they
//! share.

#[macro_use] extern crate log;

pub extern crate mlsys_system as system;
pub extern crate mlsys_tensor as tensor;

pub type FailResult<T> = Result<T, failure::Error>;

pub mod entry_points;
pub mod logging;
pub mod inspect;

pub use crate::inspect::{InspectArgs, run as run_inspect};

/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::FailResult;
use crate::inspect::{self, InspectArgs};
use crate::logging::GlobalLogger;

use ::std::ffi::OsStr;

fn wrap_result_main<F>(main: F)
where F: FnOnce() -> FailResult<()>,
{
    main().unwrap_or_else(|e| {
        for cause in e.iter_chain() {
            error!("{}", cause);
        }

        if ::std::env::var_os("RUST_BACKTRACE") == Some(OsStr::new("1").to_owned()) {
            error!("{}", e.backtrace());
        }
        ::std::process::exit(1);
    });
}

pub fn inspect() {
    wrap_result_main(|| {
        let matches = inspect::app().get_matches();
        let args = InspectArgs::from_matches(&matches)?;

        let mut logger = GlobalLogger::default();
        logger.verbosity(args.verbosity);
        if let Some(path) = &args.log {
            logger.path(path);
        }
        logger.apply()?;

        let report = inspect::run(&args)?;
        print!("{}", report);
        Ok(())
    });
}

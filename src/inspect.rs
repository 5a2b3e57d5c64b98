/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::FailResult;
use crate::system::{NeighborListOptions, System, neighbor_list_block, register_autograd_neighbors};
use crate::tensor::{DType, Device};

use ::clap::{App, Arg, ArgMatches};
use ::failure::{bail, ResultExt};
use ::std::ffi::OsString;
use ::std::fmt::Write;
use ::std::path::PathBuf;

/// Settings of `mlsys-inspect`.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectArgs {
    pub input: PathBuf,
    pub dtype: Option<DType>,
    pub device: Option<Device>,
    pub check_consistency: bool,
    pub output: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub verbosity: i32,
}

pub(crate) fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("mlsys-inspect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reads a system stored as JSON, and describes it and its neighbor lists.")
        .args(&[
            Arg::with_name("input")
                .value_name("INPUT")
                .required(true)
                .help("System JSON file"),
            Arg::with_name("dtype")
                .long("dtype")
                .value_name("DTYPE")
                .help("convert positions, cell and neighbor lists to this floating point dtype"),
            Arg::with_name("device")
                .long("device")
                .value_name("DEVICE")
                .help("move the system to this device (cpu, cuda:N, meta)"),
            Arg::with_name("check_consistency")
                .long("check-consistency")
                .help("recompute every neighbor pair from the positions and cell"),
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("FILE")
                .help("write the (converted) system to this JSON file"),
            Arg::with_name("log")
                .long("log")
                .value_name("FILE")
                .help("also write the log to this file"),
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("more logging; can be repeated"),
        ])
}

impl InspectArgs {
    pub fn from_matches(matches: &ArgMatches) -> FailResult<InspectArgs> {
        let dtype = match matches.value_of("dtype") {
            Some(name) => {
                let dtype = name.parse::<DType>()?;
                if !dtype.is_floating_point() {
                    bail!("--dtype must be a floating point type, got {}", dtype);
                }
                Some(dtype)
            },
            None => None,
        };
        let device = match matches.value_of("device") {
            Some(name) => Some(name.parse::<Device>()?),
            None => None,
        };

        Ok(InspectArgs {
            input: PathBuf::from(matches.value_of_os("input").unwrap_or_default()),
            dtype,
            device,
            check_consistency: matches.is_present("check_consistency"),
            output: matches.value_of_os("output").map(PathBuf::from),
            log: matches.value_of_os("log").map(PathBuf::from),
            verbosity: matches.occurrences_of("verbose") as i32,
        })
    }

    /// Parse a full command line, program name included.
    pub fn from_args<I, T>(args: I) -> FailResult<InspectArgs>
    where
        I: IntoIterator<Item=T>,
        T: Into<OsString> + Clone,
    {
        let matches = app().get_matches_from_safe(args)?;
        InspectArgs::from_matches(&matches)
    }
}

/// Read, convert, check and possibly re-write a system. Returns a
/// description of the system.
pub fn run(args: &InspectArgs) -> FailResult<String> {
    let json = ::std::fs::read_to_string(&args.input)
        .with_context(|e| format!("while reading {}: {}", args.input.display(), e))?;
    let system = System::from_json(&json)
        .with_context(|e| format!("while parsing {}: {}", args.input.display(), e))?;
    info!("read {} from {}", system, args.input.display());

    let system = match (args.dtype, args.device) {
        (None, None) => system,
        (dtype, device) => system.to(dtype, device)?,
    };

    let mut report = String::new();
    writeln!(report, "{}", system)?;
    writeln!(report, "dtype: {}, device: {}", system.dtype(), system.device())?;

    let known = system.known_neighbor_lists();
    writeln!(report, "{} neighbor list(s)", known.len())?;
    for options in &known {
        let neighbors = system.get_neighbor_list(options)?;
        if args.check_consistency {
            check_consistency(&system, options)?;
        }
        let unit = match options.length_unit() {
            "" => String::new(),
            unit => format!(" [{}]", unit),
        };
        writeln!(report, "  - {}{}: {} pairs", options, unit, neighbors.values().size(0))?;
    }

    if let Some(path) = &args.output {
        ::std::fs::write(path, system.to_json()?)
            .with_context(|e| format!("while writing {}: {}", path.display(), e))?;
        info!("wrote the system to {}", path.display());
    }
    Ok(report)
}

/// Recompute the pairs of one stored neighbor list from the positions and
/// cell. The check runs on a detached copy of the distances, so the stored
/// list stays out of any computational graph.
pub(crate) fn check_consistency(system: &System, options: &NeighborListOptions) -> FailResult<()> {
    let neighbors = system.get_neighbor_list(options)?;
    let copy = neighbor_list_block(neighbors.samples().values().clone(), neighbors.values().detach())?;
    register_autograd_neighbors(system, &copy, true)?;
    debug!("{} is consistent with the system", options);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn arguments() {
        let args = InspectArgs::from_args(vec![
            "mlsys-inspect", "system.json", "--dtype", "float32", "--device", "cuda:1",
            "--check-consistency", "-o", "out.json", "-vv",
        ]).unwrap();
        assert_eq!(args, InspectArgs {
            input: "system.json".into(),
            dtype: Some(DType::Float32),
            device: Some(Device::Cuda(1)),
            check_consistency: true,
            output: Some("out.json".into()),
            log: None,
            verbosity: 2,
        });

        assert!(InspectArgs::from_args(vec!["mlsys-inspect"]).is_err());
        assert!(InspectArgs::from_args(vec!["mlsys-inspect", "a.json", "--dtype", "int32"]).is_err());
        assert!(InspectArgs::from_args(vec!["mlsys-inspect", "a.json", "--device", "tpu"]).is_err());
    }

    #[test]
    fn consistency_check_leaves_stored_lists_alone() {
        let mut system = System::new(
            Tensor::from_i32(vec![1, 1], &[2]).unwrap(),
            Tensor::from_rows(&[[0.0, 0.0, 0.0], [0.0, 1.5, 0.0]]),
            Tensor::zeros(&[3, 3], DType::Float64, Device::Cpu),
            Tensor::from_bools(vec![false; 3], &[3]).unwrap(),
        ).unwrap();
        system.positions().set_requires_grad(true).unwrap();

        let options = NeighborListOptions::new(2.0, false, "");
        let neighbors = neighbor_list_block(
            Tensor::from_i32(vec![0, 1, 0, 0, 0], &[1, 5]).unwrap(),
            Tensor::from_f64(vec![0.0, 1.5, 0.0], &[1, 3, 1]).unwrap(),
        ).unwrap();
        system.add_neighbor_list(options.clone(), neighbors).unwrap();

        // checking twice would fail if the stored distances joined the graph
        check_consistency(&system, &options).unwrap();
        check_consistency(&system, &options).unwrap();
        let stored = system.get_neighbor_list(&options).unwrap().values();
        assert!(!stored.requires_grad());
        assert_eq!(stored.grad_fn_name(), None);

        let mut moved = system.clone();
        moved.set_positions(Tensor::from_rows(&[[0.0, 0.0, 0.0], [0.0, 1.7, 0.0]])).unwrap();
        assert!(check_consistency(&moved, &options).is_err());
    }
}

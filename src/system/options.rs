/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::Result;
use crate::units;

use ::std::cmp::Ordering;
use ::std::fmt;
use ::std::hash::{Hash, Hasher};

/// Describes one neighbor list a model wants: the cutoff, whether pairs are
/// listed in both directions, and the unit of the cutoff.
///
/// This is the key of the neighbor list registry of a [`System`]. Equality,
/// ordering, and hashing only look at `cutoff` (bit for bit), `full_list` and
/// `length_unit`; the requestors are bookkeeping and never change identity.
///
/// [`System`]: struct.System.html
#[derive(Debug, Clone)]
pub struct NeighborListOptions {
    cutoff: f64,
    full_list: bool,
    length_unit: String,
    requestors: Vec<String>,
}

impl NeighborListOptions {
    /// An empty `requestor` is not recorded.
    pub fn new(cutoff: f64, full_list: bool, requestor: impl Into<String>) -> Self {
        let mut options = NeighborListOptions {
            cutoff,
            full_list,
            length_unit: String::new(),
            requestors: vec![],
        };
        options.add_requestor(requestor);
        options
    }

    pub fn cutoff(&self) -> f64 { self.cutoff }
    pub fn full_list(&self) -> bool { self.full_list }

    /// Empty if the unit was never specified.
    pub fn length_unit(&self) -> &str { &self.length_unit }

    /// Everyone who asked for this list, in the order they asked.
    pub fn requestors(&self) -> &[String] { &self.requestors }

    /// Record another requestor. Repeats and empty names are ignored.
    pub fn add_requestor(&mut self, requestor: impl Into<String>) {
        let requestor = requestor.into();
        if requestor.is_empty() || self.requestors.contains(&requestor) {
            return;
        }
        self.requestors.push(requestor);
    }

    pub fn set_length_unit(&mut self, length_unit: impl Into<String>) -> Result<()> {
        let length_unit = length_unit.into();
        units::validate_unit("length", &length_unit)?;
        self.length_unit = length_unit;
        Ok(())
    }

    /// Builder-style [`NeighborListOptions::set_length_unit`].
    pub fn with_length_unit(mut self, length_unit: impl Into<String>) -> Result<Self> {
        self.set_length_unit(length_unit)?;
        Ok(self)
    }

    /// The cutoff expressed in the length unit used by the engine.
    pub fn engine_cutoff(&self, engine_length_unit: &str) -> Result<f64> {
        let factor = units::unit_conversion_factor("length", &self.length_unit, engine_length_unit)?;
        Ok(self.cutoff * factor)
    }

    /// Multi-line description, including the requestors.
    pub fn repr(&self) -> String {
        let mut out = String::from("NeighborListOptions\n");
        out += &format!("    cutoff: {:.6}", self.cutoff);
        if !self.length_unit.is_empty() {
            out += &format!(" {}", self.length_unit);
        }
        out += &format!("\n    full_list: {}\n", py_bool(self.full_list));

        if !self.requestors.is_empty() {
            out += "    requested by:\n";
            for requestor in &self.requestors {
                out += &format!("        - {}\n", requestor);
            }
        }
        out
    }

    fn identity(&self) -> (u64, bool, &str) {
        (self.cutoff.to_bits(), self.full_list, &self.length_unit)
    }
}

fn py_bool(b: bool) -> &'static str {
    match b {
        true => "True",
        false => "False",
    }
}

/// `NeighborListOptions(cutoff=5.000000, full_list=True)`
impl fmt::Display for NeighborListOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NeighborListOptions(cutoff={:.6}, full_list={})", self.cutoff, py_bool(self.full_list))
    }
}

impl PartialEq for NeighborListOptions {
    fn eq(&self, other: &Self) -> bool { self.identity() == other.identity() }
}

impl Eq for NeighborListOptions {}

impl Hash for NeighborListOptions {
    fn hash<H: Hasher>(&self, state: &mut H) { self.identity().hash(state) }
}

impl PartialOrd for NeighborListOptions {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

// total_cmp agrees with bitwise equality, which keeps Ord consistent with Eq
impl Ord for NeighborListOptions {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cutoff.total_cmp(&other.cutoff)
            .then(self.full_list.cmp(&other.full_list))
            .then_with(|| self.length_unit.cmp(&other.length_unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::std::collections::HashSet;

    #[test]
    fn requestors() {
        let mut options = NeighborListOptions::new(3.5, true, "");
        assert!(options.requestors().is_empty());

        options.add_requestor("model");
        options.add_requestor("other");
        options.add_requestor("model");
        options.add_requestor("");
        assert_eq!(options.requestors(), &["model".to_string(), "other".to_string()]);
    }

    #[test]
    fn identity_ignores_requestors() {
        let a = NeighborListOptions::new(3.5, true, "a");
        let b = NeighborListOptions::new(3.5, true, "b");
        let c = NeighborListOptions::new(3.5, false, "a");
        let d = NeighborListOptions::new(3.5, true, "a").with_length_unit("nm").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.cmp(&b), Ordering::Equal);

        let set = vec![a, b, c, d].into_iter().collect::<HashSet<_>>();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn units() {
        let mut options = NeighborListOptions::new(0.5, false, "");
        assert_eq!(options.engine_cutoff("angstrom").unwrap(), 0.5);

        options.set_length_unit("nm").unwrap();
        assert_eq!(options.engine_cutoff("angstrom").unwrap(), 5.0);
        assert!(options.set_length_unit("parsec").is_err());
        assert_eq!(options.length_unit(), "nm");
    }

    #[test]
    fn string_forms() {
        let mut options = NeighborListOptions::new(5.0, false, "some model");
        assert_eq!(options.to_string(), "NeighborListOptions(cutoff=5.000000, full_list=False)");
        assert_eq!(options.repr(), "\
NeighborListOptions
    cutoff: 5.000000
    full_list: False
    requested by:
        - some model
");

        options.set_length_unit("angstrom").unwrap();
        assert!(options.repr().contains("    cutoff: 5.000000 angstrom\n"));
    }
}

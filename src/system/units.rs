/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Conversion factors between the units of a few physical quantities.
//!
//! Unit names are matched case-insensitively. The empty string stands for
//! "unknown unit", and converts to and from anything with a factor of one.

use crate::{Error, Result};

/// Size of one `unit` in the reference unit of `quantity`
/// (angstrom for lengths, eV for energies).
fn reference_factor(quantity: &str, unit: &str) -> Result<f64> {
    let lowered = unit.trim().to_lowercase();
    let factor = match quantity {
        "length" => match &lowered[..] {
            "angstrom" | "a" => Some(1.0),
            "bohr" => Some(0.529_177_210_903),
            "nanometer" | "nm" => Some(10.0),
            "micrometer" | "um" | "µm" => Some(1e4),
            "millimeter" | "mm" => Some(1e7),
            "centimeter" | "cm" => Some(1e8),
            "meter" | "m" => Some(1e10),
            _ => None,
        },
        "energy" => match &lowered[..] {
            "ev" => Some(1.0),
            "mev" => Some(1e-3),
            "hartree" => Some(27.211_386_245_988),
            "rydberg" | "ry" => Some(13.605_693_122_994),
            "kcal/mol" => Some(0.043_364_104_241_800_934),
            "kj/mol" => Some(0.010_364_269_656_262_175),
            "joule" | "j" => Some(6.241_509_074_460_763e18),
            _ => None,
        },
        _ => return Err(Error::UnknownQuantity(quantity.to_string())),
    };
    factor.ok_or_else(|| Error::InvalidUnit {
        quantity: quantity.to_string(),
        unit: unit.to_string(),
    })
}

/// Check that `unit` is a known unit for `quantity`.
pub fn validate_unit(quantity: &str, unit: &str) -> Result<()> {
    match reference_factor(quantity, unit) {
        Ok(_) => Ok(()),
        Err(Error::InvalidUnit { .. }) if unit.is_empty() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Factor to multiply a value in `from_unit` by to express it in `to_unit`.
pub fn unit_conversion_factor(quantity: &str, from_unit: &str, to_unit: &str) -> Result<f64> {
    validate_unit(quantity, from_unit)?;
    validate_unit(quantity, to_unit)?;
    if from_unit.is_empty() || to_unit.is_empty() {
        return Ok(1.0);
    }
    Ok(reference_factor(quantity, from_unit)? / reference_factor(quantity, to_unit)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths() {
        assert_eq!(unit_conversion_factor("length", "nm", "Angstrom").unwrap(), 10.0);
        assert_eq!(unit_conversion_factor("length", "angstrom", "A").unwrap(), 1.0);
        let factor = unit_conversion_factor("length", "bohr", "angstrom").unwrap();
        assert!((factor - 0.529177210903).abs() < 1e-15);
        assert!(validate_unit("length", "furlong").is_err());
    }

    #[test]
    fn unknown_is_identity() {
        assert_eq!(unit_conversion_factor("length", "", "nm").unwrap(), 1.0);
        assert_eq!(unit_conversion_factor("length", "bohr", "").unwrap(), 1.0);
        assert!(validate_unit("length", "").is_ok());
    }

    #[test]
    fn bad_quantity() {
        match validate_unit("pressure", "") {
            Err(Error::UnknownQuantity(q)) => assert_eq!(q, "pressure"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn energies() {
        let factor = unit_conversion_factor("energy", "Hartree", "meV").unwrap();
        assert!((factor - 27211.386245988).abs() < 1e-6);
    }
}

/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

use crate::{Result, NeighborListOptions, TensorBlock};
use crate::neighbors::neighbor_list_schema_check;
use crate::tensor::{DType, Device, Tensor};

use ::std::collections::{BTreeMap, HashSet};
use ::std::fmt;
use ::std::sync::Once;
use ::itertools::Itertools;

/// Atomic types, positions, the periodic cell and its periodicity, plus the
/// neighbor lists and custom data attached to them.
///
/// Invariants (checked on construction and by every setter):
///
/// * all four tensors are on the same device;
/// * `types` is 1-D and stored as `int32`;
/// * `positions` is `[len(types), 3]` and floating point;
/// * `cell` is `[3, 3]` with the dtype of `positions`, lattice vectors as rows;
/// * `pbc` is 3 booleans;
/// * along any direction where `pbc` is false, the cell vector is zero.
///
/// Setters replace a whole tensor at once and never change the number of atoms.
#[derive(Debug, Clone)]
pub struct System {
    types: Tensor,
    positions: Tensor,
    cell: Tensor,
    pbc: Tensor,
    neighbors: BTreeMap<NeighborListOptions, TensorBlock>,
    data: BTreeMap<String, TensorBlock>,
}

lazy_static! {
    static ref RESERVED_DATA_NAMES: HashSet<&'static str> = vec![
        "types",
        "positions", "position",
        "cell",
        "neighbors", "neighbor",
    ].into_iter().collect();
}

static CUSTOM_DATA_WARNING: Once = Once::new();

fn check_cell_for_pbc(cell: &Tensor, pbc: &Tensor) -> Result<()> {
    // no data to look at
    if pbc.device().is_meta() {
        return Ok(());
    }

    let pbc = pbc.to_bool_vec()?;
    let cell = cell.to_f64_vec()?;
    for (direction, &periodic) in pbc.iter().enumerate() {
        if !periodic && cell[3 * direction..3 * direction + 3].iter().any(|&x| x != 0.0) {
            throw!(Shape, "if `pbc` is False along any direction, the corresponding cell vector must be zero");
        }
    }
    Ok(())
}

fn shape_str(tensor: &Tensor) -> String {
    format!("[{}]", tensor.shape().iter().join(", "))
}

impl System {
    pub fn new(types: Tensor, positions: Tensor, cell: Tensor, pbc: Tensor) -> Result<System> {
        let device = types.device();
        if positions.device() != device || cell.device() != device || pbc.device() != device {
            throw!(Mismatch,
                "`types`, `positions`, `cell`, and `pbc` must be on the same device, got {}, {}, {}, and {}",
                device, positions.device(), cell.device(), pbc.device(),
            );
        }

        if types.dim() != 1 {
            throw!(Shape,
                "`types` must be a 1 dimensional tensor, got a tensor with {} dimensions", types.dim(),
            );
        }
        if !types.dtype().can_cast(DType::Int32) {
            throw!(Mismatch, "`types` must be a tensor of integers, got {} instead", types.dtype());
        }
        let types = types.to(Some(DType::Int32), None)?;

        let n_atoms = types.size(0);
        if positions.dim() != 2 {
            throw!(Shape,
                "`positions` must be a 2 dimensional tensor, got a tensor with {} dimensions", positions.dim(),
            );
        }
        if positions.size(0) != n_atoms || positions.size(1) != 3 {
            throw!(Shape,
                "`positions` must be a (len(types) x 3) tensor, got a tensor with shape {}", shape_str(&positions),
            );
        }
        if !positions.is_floating_point() {
            throw!(Mismatch,
                "`positions` must be a tensor of floating point data, got {} instead", positions.dtype(),
            );
        }

        if cell.dim() != 2 {
            throw!(Shape, "`cell` must be a 2 dimensional tensor, got a tensor with {} dimensions", cell.dim());
        }
        if cell.size(0) != 3 || cell.size(1) != 3 {
            throw!(Shape, "`cell` must be a (3 x 3) tensor, got a tensor with shape {}", shape_str(&cell));
        }
        if cell.dtype() != positions.dtype() {
            throw!(Mismatch,
                "`cell` must be have the same dtype as `positions`, got {} and {}",
                cell.dtype(), positions.dtype(),
            );
        }

        if pbc.dim() != 1 {
            throw!(Shape, "`pbc` must be a 1 dimensional tensor, got a tensor with {} dimensions", pbc.dim());
        }
        if pbc.size(0) != 3 {
            throw!(Shape, "`pbc` must contain 3 entries, got a tensor with {} values", pbc.size(0));
        }
        if pbc.dtype() != DType::Bool {
            throw!(Mismatch, "`pbc` must be a tensor of booleans, got {} instead", pbc.dtype());
        }

        check_cell_for_pbc(&cell, &pbc)?;

        Ok(System {
            types, positions, cell, pbc,
            neighbors: BTreeMap::new(),
            data: BTreeMap::new(),
        })
    }

    /// Number of atoms.
    pub fn len(&self) -> usize { self.types.size(0) }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn types(&self) -> &Tensor { &self.types }
    pub fn positions(&self) -> &Tensor { &self.positions }
    pub fn cell(&self) -> &Tensor { &self.cell }
    pub fn pbc(&self) -> &Tensor { &self.pbc }

    pub fn device(&self) -> Device { self.types.device() }

    /// Floating point dtype of `positions` and `cell`.
    pub fn dtype(&self) -> DType { self.positions.dtype() }
}

/// Setters
impl System {
    /// Any dtype that casts to `int32` is accepted and converted.
    pub fn set_types(&mut self, types: Tensor) -> Result<()> {
        if types.device() != self.device() {
            throw!(Mismatch,
                "new `types` must be on the same device as existing data, got {} and {}",
                types.device(), self.device(),
            );
        }
        if types.dim() != 1 {
            throw!(Shape,
                "new `types` must be a 1 dimensional tensor, got a tensor with {} dimensions", types.dim(),
            );
        }
        if types.size(0) != self.len() {
            throw!(Shape,
                "new `types` must contain {} entries, got a tensor with {} values", self.len(), types.size(0),
            );
        }
        if !types.dtype().can_cast(DType::Int32) {
            throw!(Mismatch, "new `types` must be a tensor of integers, got {} instead", types.dtype());
        }
        self.types = types.to(Some(DType::Int32), None)?;
        Ok(())
    }

    pub fn set_positions(&mut self, positions: Tensor) -> Result<()> {
        if positions.device() != self.device() {
            throw!(Mismatch,
                "new `positions` must be on the same device as existing data, got {} and {}",
                positions.device(), self.device(),
            );
        }
        if positions.dtype() != self.dtype() {
            throw!(Mismatch,
                "new `positions` must have the same dtype as existing data, got {} and {}",
                positions.dtype(), self.dtype(),
            );
        }
        if positions.dim() != 2 {
            throw!(Shape,
                "new `positions` must be a 2 dimensional tensor, got a tensor with {} dimensions", positions.dim(),
            );
        }
        if positions.size(0) != self.len() || positions.size(1) != 3 {
            throw!(Shape,
                "new `positions` must be a (len(types) x 3) tensor, got a tensor with shape {}",
                shape_str(&positions),
            );
        }
        self.positions = positions;
        Ok(())
    }

    /// Does not re-check the cell against `pbc`; see [`System::set_pbc`].
    pub fn set_cell(&mut self, cell: Tensor) -> Result<()> {
        if cell.device() != self.device() {
            throw!(Mismatch,
                "new `cell` must be on the same device as existing data, got {} and {}",
                cell.device(), self.device(),
            );
        }
        if cell.dtype() != self.dtype() {
            throw!(Mismatch,
                "new `cell` must have the same dtype as existing data, got {} and {}",
                cell.dtype(), self.dtype(),
            );
        }
        if cell.dim() != 2 {
            throw!(Shape, "new `cell` must be a 2 dimensional tensor, got a tensor with {} dimensions", cell.dim());
        }
        if cell.size(0) != 3 || cell.size(1) != 3 {
            throw!(Shape, "new `cell` must be a (3 x 3) tensor, got a tensor with shape {}", shape_str(&cell));
        }
        self.cell = cell;
        Ok(())
    }

    /// Also checks that the current cell is zero along non-periodic directions.
    pub fn set_pbc(&mut self, pbc: Tensor) -> Result<()> {
        if pbc.device() != self.device() {
            throw!(Mismatch,
                "new `pbc` must be on the same device as existing data, got {} and {}",
                pbc.device(), self.device(),
            );
        }
        if pbc.dtype() != DType::Bool {
            throw!(Mismatch, "new `pbc` must be a tensor of booleans, got {} instead", pbc.dtype());
        }
        if pbc.dim() != 1 {
            throw!(Shape, "new `pbc` must be a 1 dimensional tensor, got a tensor with {} dimensions", pbc.dim());
        }
        if pbc.size(0) != 3 {
            throw!(Shape, "new `pbc` must contain 3 entries, got a tensor with {} values", pbc.size(0));
        }
        check_cell_for_pbc(&self.cell, &pbc)?;
        self.pbc = pbc;
        Ok(())
    }
}

/// Neighbor lists
impl System {
    /// Attach a neighbor list computed elsewhere.
    ///
    /// `neighbors` must follow the neighbor list layout (see
    /// [`neighbor_list_schema_check`]), have no gradients, and match the device
    /// and dtype of this system. Fails if a list for equal `options` exists.
    pub fn add_neighbor_list(&mut self, options: NeighborListOptions, neighbors: TensorBlock) -> Result<()> {
        neighbor_list_schema_check(&neighbors)?;

        if !neighbors.gradients_list().is_empty() {
            throw!(Schema, "`neighbors` should not have any gradients");
        }

        let values = neighbors.values();
        if values.device() != self.device() {
            throw!(Mismatch,
                "`neighbors` device ({}) does not match this system's device ({})",
                values.device(), self.device(),
            );
        }
        if values.dtype() != self.dtype() {
            throw!(Mismatch,
                "`neighbors` dtype ({}) does not match this system's dtype ({})",
                values.dtype(), self.dtype(),
            );
        }

        let requires_grad = self.positions.requires_grad() || self.cell.requires_grad();
        if requires_grad && !values.requires_grad() {
            warn!("\
                This system's positions or cell requires grad, but the neighbors does not. \
                You should use `register_autograd_neighbors()` to make sure the neighbors \
                distance vectors are integrated in the computational graph.\
            ");
        }

        if self.neighbors.contains_key(&options) {
            throw!(Registry, "the neighbors list for {} already exists in this system", options);
        }

        debug!("adding neighbor list with {} pairs for {}", values.size(0), options);
        self.neighbors.insert(options, neighbors);
        Ok(())
    }

    pub fn get_neighbor_list(&self, options: &NeighborListOptions) -> Result<&TensorBlock> {
        match self.neighbors.get(options) {
            Some(neighbors) => Ok(neighbors),
            None => {
                throw!(Registry,
                    "No neighbor list for {} was found.\n\
                    Is it part of the `requested_neighbor_lists` for this model?",
                    options,
                );
            },
        }
    }

    /// Options of every neighbor list in this system.
    pub fn known_neighbor_lists(&self) -> Vec<NeighborListOptions> {
        self.neighbors.keys().cloned().collect()
    }

    pub(crate) fn neighbor_lists(&self) -> impl Iterator<Item=(&NeighborListOptions, &TensorBlock)> {
        self.neighbors.iter()
    }
}

fn valid_data_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn check_reserved_name(name: &str) -> Result<()> {
    if RESERVED_DATA_NAMES.contains(&name.to_lowercase()[..]) {
        throw!(Registry, "custom data can not be named '{}'", name);
    }
    Ok(())
}

/// Custom data
impl System {
    /// Attach arbitrary data under `name`.
    ///
    /// An existing entry is only replaced when `overwrite` is true.
    pub fn add_data(&mut self, name: &str, values: TensorBlock, overwrite: bool) -> Result<()> {
        if !valid_data_name(name) {
            throw!(Registry, "custom data name '{}' is invalid: only [a-z A-Z 0-9 _-] are accepted", name);
        }
        check_reserved_name(name)?;

        if !overwrite && self.data.contains_key(name) {
            throw!(Registry, "custom data '{}' is already present in this system", name);
        }

        let tensor = values.values();
        if tensor.device() != self.device() {
            throw!(Mismatch,
                "device ({}) of the custom data '{}' does not match this system device ({})",
                tensor.device(), name, self.device(),
            );
        }
        if tensor.dtype() != self.dtype() {
            throw!(Mismatch,
                "dtype ({}) of custom data '{}' does not match this system dtype ({})",
                tensor.dtype(), name, self.dtype(),
            );
        }

        self.data.insert(name.to_string(), values);
        Ok(())
    }

    pub fn get_data(&self, name: &str) -> Result<&TensorBlock> {
        check_reserved_name(name)?;

        let values = match self.data.get(name) {
            Some(values) => values,
            None => { throw!(Registry, "no data for '{}' found in this system", name); },
        };

        CUSTOM_DATA_WARNING.call_once(|| {
            warn!("\
                custom data '{}' is experimental, please contact the developers \
                to add this data as a member of the `System` class\
            ", name);
        });
        Ok(values)
    }

    pub fn known_data(&self) -> Vec<String> { self.data.keys().cloned().collect() }
}

impl System {
    /// Convert positions, cell, neighbor lists and custom data to `dtype`,
    /// and move everything to `device`.
    ///
    /// `types` and `pbc` keep their dtype.
    pub fn to(&self, dtype: Option<DType>, device: Option<Device>) -> Result<System> {
        let mut system = System::new(
            self.types.to(None, device)?,
            self.positions.to(dtype, device)?,
            self.cell.to(dtype, device)?,
            self.pbc.to(None, device)?,
        )?;

        for (options, neighbors) in &self.neighbors {
            system.add_neighbor_list(options.clone(), neighbors.to(dtype, device)?)?;
        }
        for (name, values) in &self.data {
            system.add_data(name, values.to(dtype, device)?, false)?;
        }
        Ok(system)
    }
}

/// `System with 2 atoms, non periodic`, or with the cell listed row by row.
impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "System with {} atoms, ", self.len())?;
        match self.cell.to_f64_vec() {
            Err(_) => write!(f, "cell on the meta device"),
            Ok(ref cell) if cell.iter().all(|&x| x == 0.0) => write!(f, "non periodic"),
            Ok(cell) => write!(f, "periodic cell: [{}]", cell.iter().join(", ")),
        }
    }
}

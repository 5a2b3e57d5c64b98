/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

//! Neighbor list blocks, and splicing their distance vectors into the
//! autograd graph.
//!
//! Neighbor lists come from an external engine which already computed the
//! distance vectors. [`register_autograd_neighbors`] makes these vectors
//! behave as if they had been computed from the positions and cell of a
//! system as `positions[j] - positions[i] + shift · cell`, so that gradients
//! flow back to both.

use crate::{Error, Result, Labels, TensorBlock, System};
use crate::tensor::{self, AutogradContext, DType, Device, Function, Tensor, TensorError};

/// Sample names of a neighbor list block, in order.
pub const NEIGHBOR_SAMPLE_NAMES: [&str; 5] = [
    "first_atom", "second_atom", "cell_shift_a", "cell_shift_b", "cell_shift_c",
];

/// Assemble a neighbor list block.
///
/// `samples` is the `[n_pairs, 5]` int32 table of
/// `(first_atom, second_atom, cell_shift_a, cell_shift_b, cell_shift_c)` and
/// `distances` the `[n_pairs, 3, 1]` distance vectors. The `xyz` component
/// and the `distance` property are added here.
pub fn neighbor_list_block(samples: Tensor, distances: Tensor) -> Result<TensorBlock> {
    let device = distances.device();
    TensorBlock::new(
        distances,
        Labels::new(NEIGHBOR_SAMPLE_NAMES.to_vec(), samples)?,
        vec![Labels::range("xyz", 3)?.to(device)?],
        Labels::range("distance", 1)?.to(device)?,
    )
}

// Labels on the meta device have no values to compare.
fn labels_are(labels: &Labels, name: &str, expected: &[i64]) -> Result<bool> {
    if labels.names() != [name] || labels.count() != expected.len() {
        return Ok(false);
    }
    if labels.device().is_meta() {
        return Ok(true);
    }
    Ok(labels.values().to_i64_vec()? == expected)
}

/// Check that a block is laid out like a neighbor list: the five sample
/// names of [`NEIGHBOR_SAMPLE_NAMES`], a single `xyz = [0, 1, 2]` component
/// and a single `distance = 0` property.
pub fn neighbor_list_schema_check(neighbors: &TensorBlock) -> Result<()> {
    if neighbors.samples().names() != NEIGHBOR_SAMPLE_NAMES {
        throw!(Schema,
            "invalid samples for `neighbors`: the samples names must be \
            'first_atom', 'second_atom', 'cell_shift_a', 'cell_shift_b', 'cell_shift_c'"
        );
    }

    let components = neighbors.components();
    if components.len() != 1 || !labels_are(&components[0], "xyz", &[0, 1, 2])? {
        throw!(Schema,
            "invalid components for `neighbors`: there should be a single 'xyz'=[0, 1, 2] component"
        );
    }

    if !labels_are(neighbors.properties(), "distance", &[0])? {
        throw!(Schema,
            "invalid properties for `neighbors`: there should be a single 'distance'=0 property"
        );
    }
    Ok(())
}

/// Attach the distances of `neighbors` to the computational graph of the
/// positions and cell of `system`.
///
/// The values tensor of `neighbors` (and of every clone of the block) becomes
/// the output of a graph node; it must not already require gradients. With
/// `check_consistency`, the block's device, dtype and layout are checked
/// against the system, and every pair is recomputed from the positions and
/// cell.
pub fn register_autograd_neighbors(system: &System, neighbors: &TensorBlock, check_consistency: bool) -> Result<()> {
    let distances = neighbors.values();
    if distances.requires_grad() {
        throw!(Registry,
            "`neighbors` is already part of a computational graph, \
            detach it before calling `register_autograd_neighbors()`"
        );
    }

    if check_consistency {
        if system.positions().device() != distances.device() {
            throw!(Mismatch,
                "`system` and `neighbors` must be on the same device, got {} and {}",
                system.positions().device(), distances.device(),
            );
        }
        if system.positions().dtype() != distances.dtype() {
            throw!(Mismatch,
                "`system` and `neighbors` must have the same dtype, got {} and {}",
                system.positions().dtype(), distances.dtype(),
            );
        }
        neighbor_list_schema_check(neighbors)?;
    }

    let _ = tensor::apply::<NeighborsAutograd>((
        system.positions().clone(),
        system.cell().clone(),
        neighbors.clone(),
        check_consistency,
    ))?;
    Ok(())
}

/// `distances = positions[j] - positions[i] + shift · cell`, with the
/// distances given instead of computed.
struct NeighborsAutograd;

impl Function for NeighborsAutograd {
    type Input = (Tensor, Tensor, TensorBlock, bool);
    type Error = Error;
    const NAME: &'static str = "NeighborsAutogradBackward";

    fn differentiable_inputs(input: &Self::Input) -> Vec<Tensor> {
        vec![input.0.clone(), input.1.clone()]
    }

    fn forward(ctx: &mut AutogradContext, (positions, cell, neighbors, check_consistency): Self::Input) -> Result<Tensor> {
        let distances = neighbors.values().clone();
        if check_consistency {
            check_pairs(&positions, &cell, &neighbors)?;
        }

        ctx.save_for_backward(vec![positions, cell, distances.clone(), neighbors.samples().values().clone()]);
        Ok(distances)
    }

    fn backward(ctx: &AutogradContext, grad_output: &Tensor) -> tensor::Result<Vec<Option<Tensor>>> {
        let saved = ctx.saved_tensors();
        let (positions, cell, samples) = (&saved[0], &saved[1], &saved[3]);

        let positions_grad = match ctx.needs_input_grad(0) {
            true => Some(positions_backward(positions, samples, grad_output)?),
            false => None,
        };
        let cell_grad = match ctx.needs_input_grad(1) {
            true => Some(cell_backward(cell, samples, grad_output)?),
            false => None,
        };
        Ok(vec![positions_grad, cell_grad])
    }
}

fn backward_error(message: String) -> TensorError {
    TensorError::Backward { function: NeighborsAutograd::NAME, message }
}

fn output_like(values: Vec<f64>, shape: &[usize], dtype: DType, device: Device) -> tensor::Result<Tensor> {
    Tensor::from_floats(values, shape, dtype)?.to(None, Some(device))
}

/// Sample table and upstream gradient as flat data, after checking their
/// shapes against each other.
fn backward_data(samples: &Tensor, grad_output: &Tensor) -> tensor::Result<(Vec<i64>, Vec<f64>)> {
    let n_pairs = samples.shape().get(0).cloned().unwrap_or(0);
    if samples.shape() != [n_pairs, 5] {
        return Err(backward_error(format!("expected a [n_pairs, 5] sample table, got {:?}", samples.shape())));
    }
    if grad_output.numel() != 3 * n_pairs {
        return Err(backward_error(format!(
            "expected a gradient for {} distance vectors, got shape {:?}", n_pairs, grad_output.shape(),
        )));
    }
    Ok((samples.to_i64_vec()?, grad_output.to_f64_vec()?))
}

fn positions_backward(positions: &Tensor, samples: &Tensor, grad_output: &Tensor) -> tensor::Result<Tensor> {
    if positions.device().is_meta() {
        return Ok(Tensor::meta(positions.shape(), positions.dtype()));
    }

    let (samples, grad) = backward_data(samples, grad_output)?;
    let n_atoms = positions.size(0);
    let atom_index = |value: i64| match value {
        value if value >= 0 && (value as usize) < n_atoms => Ok(value as usize),
        value => Err(backward_error(format!("atom index {} is out of bounds for {} atoms", value, n_atoms))),
    };

    let mut positions_grad = vec![0.0; 3 * n_atoms];
    // all the `second_atom` contributions first, then the `first_atom` ones
    for &(column, sign) in &[(1, 1.0), (0, -1.0)] {
        for (pair, g) in samples.chunks(5).zip(grad.chunks(3)) {
            let atom = atom_index(pair[column])?;
            for k in 0..3 {
                positions_grad[3 * atom + k] += sign * g[k];
            }
        }
    }
    output_like(positions_grad, positions.shape(), positions.dtype(), positions.device())
}

fn cell_backward(cell: &Tensor, samples: &Tensor, grad_output: &Tensor) -> tensor::Result<Tensor> {
    if cell.device().is_meta() {
        return Ok(Tensor::meta(cell.shape(), cell.dtype()));
    }

    let (samples, grad) = backward_data(samples, grad_output)?;
    let mut cell_grad = vec![0.0; 9];
    for (pair, g) in samples.chunks(5).zip(grad.chunks(3)) {
        let shift = &pair[2..5];
        for a in 0..3 {
            for k in 0..3 {
                cell_grad[3 * a + k] += shift[a] as f64 * g[k];
            }
        }
    }
    output_like(cell_grad, cell.shape(), cell.dtype(), cell.device())
}

fn check_pairs(positions: &Tensor, cell: &Tensor, neighbors: &TensorBlock) -> Result<()> {
    let n_atoms = positions.size(0);
    let epsilon = match neighbors.values().dtype() {
        DType::Float64 => 1e-6,
        _ => 1e-4,
    };

    let positions = positions.to_f64_vec()?;
    let cell = cell.to_f64_vec()?;
    let samples = neighbors.samples().values().to_i64_vec()?;
    let distances = neighbors.values().to_f64_vec()?;
    let width = neighbors.samples().names().len();
    if width != 5 || distances.len() != 3 * neighbors.samples().count() {
        throw!(Schema,
            "`neighbors` should have 5 samples columns and [n_pairs, 3, 1] values, got {} columns and {} values",
            width, distances.len(),
        );
    }

    for (pair, actual) in samples.chunks(5).zip(distances.chunks(3)) {
        let (i, j, shift) = (pair[0], pair[1], &pair[2..5]);
        for &(atom, name) in &[(i, "first_atom"), (j, "second_atom")] {
            if atom < 0 || atom >= n_atoms as i64 {
                throw!(Consistency,
                    "checking internal consistency: '{}' in neighbor list ({}) is out of bounds \
                    (we have {} atoms in the system)",
                    name, atom, n_atoms,
                );
            }
        }

        let (i, j) = (i as usize, j as usize);
        let mut expected = [0.0; 3];
        for k in 0..3 {
            expected[k] = positions[3 * j + k] - positions[3 * i + k];
            expected[k] += (0..3).map(|a| shift[a] as f64 * cell[3 * a + k]).sum::<f64>();
        }

        let norm = (0..3).map(|k| (actual[k] - expected[k]).powi(2)).sum::<f64>().sqrt();
        if !(norm <= epsilon) {
            throw!(Consistency,
                "checking internal consistency: one neighbor pair does not match its metadata: \
                the pair between atom {} and atom {} for the [{}, {}, {}] cell shift should have \
                a distance vector of [{}, {}, {}] but has a distance vector of [{}, {}, {}] \
                norm difference is {}",
                i, j, shift[0], shift[1], shift[2],
                expected[0], expected[1], expected[2],
                actual[0], actual[1], actual[2],
                norm,
            );
        }
    }
    trace!("{} neighbor pairs are consistent with the system", samples.len() / 5);
    Ok(())
}

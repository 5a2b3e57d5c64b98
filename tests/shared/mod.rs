/* ************************************************************************ **
** This file is part of mlsys, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
** ************************************************************************ */

#![allow(dead_code)]

use ::mlsys::system::{System, TensorBlock, neighbor_list_block};
use ::mlsys::tensor::Tensor;
use ::itertools::iproduct;

pub const POSITIONS: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.2, 0.3, 0.1],
    [0.4, 1.9, 2.2],
    [2.7, 2.5, 0.8],
];

pub const CELL: [[f64; 3]; 3] = [
    [3.5, 0.0, 0.0],
    [0.4, 3.1, 0.0],
    [0.0, -0.3, 3.3],
];

/// Four atoms in a slightly sheared periodic cell.
pub fn periodic_system() -> System {
    System::new(
        Tensor::from_i32(vec![1, 6, 6, 8], &[4]).unwrap(),
        Tensor::from_rows(&POSITIONS),
        Tensor::from_rows(&CELL),
        Tensor::from_bools(vec![true; 3], &[3]).unwrap(),
    ).unwrap()
}

/// `positions[j] - positions[i] + shift · cell` for a `(i, j, sa, sb, sc)` row.
pub fn distance(positions: &[f64], cell: &[f64], pair: &[i64]) -> [f64; 3] {
    let (i, j) = (pair[0] as usize, pair[1] as usize);
    let mut out = [0.0; 3];
    for k in 0..3 {
        out[k] = positions[3 * j + k] - positions[3 * i + k];
        for a in 0..3 {
            out[k] += pair[2 + a] as f64 * cell[3 * a + k];
        }
    }
    out
}

/// Every pair within `cutoff`, looking at the 27 nearest images.
///
/// Half lists keep a pair `(i, j, shift)` when `i < j`, or when `i == j` and
/// the shift is lexicographically positive.
pub fn brute_force_neighbors(system: &System, cutoff: f64, full_list: bool) -> TensorBlock {
    let positions = system.positions().to_f64_vec().unwrap();
    let cell = system.cell().to_f64_vec().unwrap();
    let n_atoms = system.len() as i64;

    let mut samples = vec![];
    let mut distances = vec![];
    let shifts = iproduct!(-1..2, -1..2, -1..2).collect::<Vec<(i64, i64, i64)>>();
    for (i, j) in iproduct!(0..n_atoms, 0..n_atoms) {
        for &shift in &shifts {
            if i == j && shift == (0, 0, 0) {
                continue;
            }
            if !full_list && !(i < j || (i == j && shift > (0, 0, 0))) {
                continue;
            }

            let pair = [i, j, shift.0, shift.1, shift.2];
            let d = distance(&positions, &cell, &pair);
            if d.iter().map(|x| x * x).sum::<f64>().sqrt() < cutoff {
                samples.extend(pair.iter().map(|&x| x as i32));
                distances.extend_from_slice(&d);
            }
        }
    }

    let n_pairs = samples.len() / 5;
    neighbor_list_block(
        Tensor::from_i32(samples, &[n_pairs, 5]).unwrap(),
        Tensor::from_floats(distances, &[n_pairs, 3, 1], system.dtype()).unwrap(),
    ).unwrap()
}

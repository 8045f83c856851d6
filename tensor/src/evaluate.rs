//! Compute: filling the value array of an assembled [`Storage`].

use log::debug;

use ht_error::*;

use super::assemble::{Sink, Traversal};
use super::kernel::{Node, View};
use super::storage::Assembled;
use super::{assemble, Expr, Format, Storage};

/// Writes one value per slot, in the order the slots were reserved during assembly.
struct Evaluator {
    values: Vec<f64>,
}

impl Sink for Evaluator {
    type Mark = usize;

    fn mark(&self, _depth: usize) -> usize {
        self.values.len()
    }

    fn rollback(&mut self, mark: usize) {
        self.values.truncate(mark)
    }

    fn coordinate(&mut self, _depth: usize, _coord: usize) {}

    fn end_segment(&mut self, _depth: usize) {}

    fn slot(&mut self, root: &Node, views: &[View], states: &[Option<usize>]) {
        // a slot where the expression is absent is an explicit zero of a dense level
        let value = root.eval(views, states).unwrap_or(0.);
        self.values.push(value);
    }
}

/// Compute the values of an assembled `storage`.
pub fn compute(storage: Storage) -> HTResult<Storage> {
    let stage = storage.stage();
    let Assembled {
        shape,
        format,
        index,
        size,
        kernel,
    } = storage
        .into_assembled()
        .map_err(|cause| cause.consume(format!("computing a {} storage", stage)))?;

    let mut evaluator = Evaluator {
        values: Vec::with_capacity(size.num_values()),
    };

    Traversal::new(&kernel, &format)?.run(&mut evaluator);

    let values = evaluator.values;
    if values.len() != size.num_values() {
        return Err(HTError::internal(format!(
            "computed {} values for an index which addresses {}",
            values.len(),
            size.num_values()
        )));
    }

    debug!("computed {} values of a tensor with shape {}", values.len(), shape);

    Ok(Storage::new(shape, format)?.computed(index, size, values))
}

/// Assemble and compute the output of `expr` in the given `format`.
pub fn evaluate(expr: Expr, format: Format) -> HTResult<Storage> {
    assemble(expr, format).and_then(compute)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Access, Coord, IndexVar, LevelIndex, Stage};

    fn read(
        name: &str,
        shape: Vec<usize>,
        format: &str,
        vars: &[&str],
        entries: Vec<(Coord, f64)>,
    ) -> Expr {
        let tensor = Storage::pack(shape.into(), format.parse().unwrap(), entries).unwrap();
        let vars = vars.iter().map(|var| IndexVar::new(var)).collect();
        Access::new(name, Arc::new(tensor), vars).unwrap().into()
    }

    fn d5a() -> Vec<(Coord, f64)> {
        vec![(vec![1], 1.), (vec![4], 2.)]
    }

    fn d5b() -> Vec<(Coord, f64)> {
        vec![(vec![0], 10.), (vec![1], 20.)]
    }

    fn d33a() -> Vec<(Coord, f64)> {
        vec![(vec![0, 1], 2.), (vec![2, 0], 3.), (vec![2, 2], 4.)]
    }

    fn d33b() -> Vec<(Coord, f64)> {
        vec![(vec![0, 0], 10.), (vec![0, 1], 20.), (vec![2, 1], 30.)]
    }

    #[test]
    fn test_vector_add() {
        let b = read("b", vec![5], "sparse", &["i"], d5a());
        let c = read("c", vec![5], "sparse", &["i"], d5b());

        let a = evaluate(b + c, "sparse".parse().unwrap()).unwrap();
        assert_eq!(a.stage(), Stage::Computed);
        assert_eq!(
            a.dimension_index(0).unwrap(),
            &LevelIndex::sparse(vec![0, 3], vec![0, 1, 4])
        );
        assert_eq!(a.values().unwrap(), &[10., 21., 2.]);
    }

    #[test]
    fn test_vector_add_dense_operand() {
        let b = read("b", vec![5], "sparse", &["i"], d5a());
        let c = read("c", vec![5], "dense", &["i"], d5b());

        let a = evaluate(b + c, "sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(0).unwrap(),
            &LevelIndex::sparse(vec![0, 5], vec![0, 1, 2, 3, 4])
        );
        assert_eq!(a.values().unwrap(), &[10., 21., 0., 0., 2.]);
    }

    #[test]
    fn test_vector_mul() {
        let b = read("b", vec![5], "sparse", &["i"], d5a());
        let c = read("c", vec![5], "sparse", &["i"], d5b());

        let a = evaluate(b.clone() * c.clone(), "sparse".parse().unwrap()).unwrap();
        assert_eq!(a.dimension_index(0).unwrap(), &LevelIndex::sparse(vec![0, 1], vec![1]));
        assert_eq!(a.values().unwrap(), &[20.]);

        let a = evaluate(b * c, "dense".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[0., 20., 0., 0., 0.]);
    }

    #[test]
    fn test_matrix_add() {
        let b = read("B", vec![3, 3], "dense,sparse", &["i", "j"], d33a());
        let c = read("C", vec![3, 3], "dense,sparse", &["i", "j"], d33b());

        let a = evaluate(b + c, "dense,sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(1).unwrap(),
            &LevelIndex::sparse(vec![0, 2, 2, 5], vec![0, 1, 0, 1, 2])
        );
        assert_eq!(a.values().unwrap(), &[10., 22., 3., 30., 4.]);
    }

    #[test]
    fn test_matrix_mul() {
        let b = read("B", vec![3, 3], "sparse,sparse", &["i", "j"], d33a());
        let c = read("C", vec![3, 3], "sparse,sparse", &["i", "j"], d33b());

        let a = evaluate(b * c, "sparse,sparse".parse().unwrap()).unwrap();
        assert_eq!(a.dimension_index(0).unwrap(), &LevelIndex::sparse(vec![0, 1], vec![0]));
        assert_eq!(a.dimension_index(1).unwrap(), &LevelIndex::sparse(vec![0, 1], vec![1]));
        assert_eq!(a.values().unwrap(), &[40.]);
    }

    #[test]
    fn test_mixed_formats() {
        let expected = vec![10., 22., 0., 0., 0., 0., 3., 30., 4.];

        for (left, right, output) in [
            ("dense,dense", "sparse,sparse", "dense,sparse"),
            ("sparse,dense", "dense,sparse", "sparse,sparse"),
            ("sparse,sparse", "sparse,sparse", "dense,dense"),
            ("dense,sparse", "sparse,dense", "sparse,dense"),
        ] {
            let b = read("B", vec![3, 3], left, &["i", "j"], d33a());
            let c = read("C", vec![3, 3], right, &["i", "j"], d33b());
            let a = evaluate(b + c, output.parse().unwrap()).unwrap();
            assert_eq!(a.to_dense().unwrap(), expected, "{} + {} -> {}", left, right, output);
        }
    }

    #[test]
    fn test_sub_and_neg() {
        let b = read("b", vec![5], "sparse", &["i"], d5a());
        let c = read("c", vec![5], "sparse", &["i"], d5b());

        let a = evaluate(b.clone() - c.clone(), "sparse".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[-10., -19., 2.]);

        let a = evaluate(-b * c, "sparse".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[-20.]);
    }

    #[test]
    fn test_broadcast() {
        let b = read("B", vec![3, 3], "dense,sparse", &["i", "j"], d33a());
        let d = read("d", vec![3], "sparse", &["i"], vec![(vec![2], 0.5)]);

        let a = evaluate(b * d, "dense,sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(1).unwrap(),
            &LevelIndex::sparse(vec![0, 0, 0, 2], vec![0, 2])
        );
        assert_eq!(a.values().unwrap(), &[1.5, 2.]);

        let b = read("b", vec![5], "sparse", &["i"], d5a());
        let s = Access::new("s", Arc::new(Storage::scalar(3.)), vec![]).unwrap();
        let a = evaluate(b * s.into(), "sparse".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[3., 6.]);
    }

    fn d8a() -> Vec<(Coord, f64)> {
        vec![(vec![0], 1.), (vec![1], 2.), (vec![2], 3.), (vec![5], 4.)]
    }

    fn d8b() -> Vec<(Coord, f64)> {
        vec![(vec![0], 10.), (vec![2], 20.), (vec![3], 30.)]
    }

    fn d8c() -> Vec<(Coord, f64)> {
        vec![(vec![1], 100.), (vec![3], 200.), (vec![5], 300.)]
    }

    #[test]
    fn test_sum_under_product() {
        let expected = vec![0., 200., 0., 6000., 0., 1200., 0., 0.];

        for (b, c, d) in [("sparse", "dense", "dense"), ("sparse", "sparse", "sparse")] {
            let expr = (read("b", vec![8], b, &["i"], d8a())
                + read("c", vec![8], c, &["i"], d8b()))
                * read("d", vec![8], d, &["i"], d8c());

            let a = evaluate(expr, "dense".parse().unwrap()).unwrap();
            assert_eq!(a.dimension_index(0).unwrap(), &LevelIndex::dense(8));
            assert_eq!(a.values().unwrap(), &expected[..], "({} + {}) * {}", b, c, d);
        }

        let expr = (read("b", vec![8], "sparse", &["i"], d8a())
            + read("c", vec![8], "sparse", &["i"], d8b()))
            * read("d", vec![8], "sparse", &["i"], d8c());

        let a = evaluate(expr, "sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(0).unwrap(),
            &LevelIndex::sparse(vec![0, 3], vec![1, 3, 5])
        );
        assert_eq!(a.values().unwrap(), &[200., 6000., 1200.]);

        // a dense factor is present everywhere, so zeros of the sum survive
        let expr = (read("b", vec![8], "sparse", &["i"], d8a())
            + read("c", vec![8], "sparse", &["i"], d8b()))
            * read("d", vec![8], "dense", &["i"], d8c());

        let a = evaluate(expr, "sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(0).unwrap(),
            &LevelIndex::sparse(vec![0, 5], vec![0, 1, 2, 3, 5])
        );
        assert_eq!(a.values().unwrap(), &[0., 200., 0., 6000., 1200.]);
    }

    #[test]
    fn test_product_under_sum() {
        let expr = read("b", vec![8], "sparse", &["i"], d8a())
            * (read("c", vec![8], "dense", &["i"], d8b())
                + read("d", vec![8], "dense", &["i"], d8c()));

        let a = evaluate(expr, "dense".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[10., 200., 60., 0., 0., 1200., 0., 0.]);

        let expr = read("b", vec![8], "sparse", &["i"], d8a())
            * read("c", vec![8], "sparse", &["i"], d8b())
            + read("d", vec![8], "sparse", &["i"], d8c());

        let a = evaluate(expr, "sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(0).unwrap(),
            &LevelIndex::sparse(vec![0, 5], vec![0, 1, 2, 3, 5])
        );
        assert_eq!(a.values().unwrap(), &[10., 100., 60., 200., 300.]);
    }

    #[test]
    fn test_difference_under_product() {
        // at 3 only the subtrahend is present, so the difference is its negation
        let expr = (read("b", vec![8], "sparse", &["i"], d8a())
            - read("c", vec![8], "sparse", &["i"], d8b()))
            * read("d", vec![8], "sparse", &["i"], d8c());

        let a = evaluate(expr, "sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(0).unwrap(),
            &LevelIndex::sparse(vec![0, 3], vec![1, 3, 5])
        );
        assert_eq!(a.values().unwrap(), &[200., -6000., 1200.]);

        let expr = -(read("d", vec![8], "sparse", &["i"], d8c())
            - read("b", vec![8], "dense", &["i"], d8a())
                * read("c", vec![8], "sparse", &["i"], d8b()));

        let a = evaluate(expr, "dense".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[10., -100., 60., -200., 0., -300., 0., 0.]);
    }

    #[test]
    fn test_scalar_broadcast_sum() {
        let entries = vec![(vec![1], 2.), (vec![4], 3.)];
        let s = Access::new("c", Arc::new(Storage::scalar(2.)), vec![]).unwrap();

        let b = read("b", vec![5], "dense", &["i"], entries.clone());
        let a = evaluate(b + s.clone().into(), "dense".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[2., 4., 2., 2., 5.]);

        let b = read("b", vec![5], "sparse", &["i"], entries.clone());
        let a = evaluate(b + s.clone().into(), "sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(0).unwrap(),
            &LevelIndex::sparse(vec![0, 5], vec![0, 1, 2, 3, 4])
        );
        assert_eq!(a.values().unwrap(), &[2., 4., 2., 2., 5.]);

        let b = read("b", vec![5], "sparse", &["i"], entries);
        let a = evaluate(b * s.into(), "dense".parse().unwrap()).unwrap();
        assert_eq!(a.values().unwrap(), &[0., 4., 0., 0., 6.]);
    }

    #[test]
    fn test_fixed_operand() {
        let b = vec![(vec![0, 1], 1.), (vec![1, 3], 2.)];
        let c = vec![(vec![0, 1], 10.), (vec![0, 2], 5.), (vec![1, 0], 7.)];

        let expr = read("B", vec![2, 4], "dense,fixed", &["i", "j"], b.clone())
            + read("C", vec![2, 4], "sparse,sparse", &["i", "j"], c.clone());

        let a = evaluate(expr, "dense,sparse".parse().unwrap()).unwrap();
        assert_eq!(
            a.dimension_index(1).unwrap(),
            &LevelIndex::sparse(vec![0, 2, 4], vec![1, 2, 0, 3])
        );
        assert_eq!(a.values().unwrap(), &[11., 5., 7., 2.]);

        let expr = read("B", vec![2, 4], "dense,fixed", &["i", "j"], b)
            * read("C", vec![2, 4], "sparse,sparse", &["i", "j"], c);

        let a = evaluate(expr, "sparse,fixed".parse().unwrap()).unwrap();
        assert_eq!(a.dimension_index(0).unwrap(), &LevelIndex::sparse(vec![0, 1], vec![0]));
        assert_eq!(a.dimension_index(1).unwrap(), &LevelIndex::fixed(1, vec![1]));
        assert_eq!(a.values().unwrap(), &[10.]);
    }

    #[test]
    fn test_column_major() {
        let b = read("B", vec![3, 3], "dense,sparse;1,0", &["i", "j"], d33a());
        let c = read("C", vec![3, 3], "sparse,sparse;1,0", &["i", "j"], d33b());

        let a = evaluate(b.clone() + c.clone(), "dense,sparse;1,0".parse().unwrap()).unwrap();
        assert_eq!(&a.shape()[..], &[3, 3]);
        assert_eq!(
            a.dimension_index(1).unwrap(),
            &LevelIndex::sparse(vec![0, 2, 4, 5], vec![0, 2, 0, 2, 2])
        );
        assert_eq!(a.values().unwrap(), &[10., 3., 22., 30., 4.]);
        assert_eq!(
            a.to_dense().unwrap(),
            vec![10., 22., 0., 0., 0., 0., 3., 30., 4.]
        );

        let a = evaluate(b * c, "sparse,sparse;1,0".parse().unwrap()).unwrap();
        assert_eq!(a.dimension_index(0).unwrap(), &LevelIndex::sparse(vec![0, 1], vec![1]));
        assert_eq!(a.dimension_index(1).unwrap(), &LevelIndex::sparse(vec![0, 1], vec![0]));
        assert_eq!(a.entries().unwrap(), vec![(vec![0, 1], 40.)]);
    }

    #[test]
    fn test_scalar_output() {
        let s = Access::new("s", Arc::new(Storage::scalar(3.)), vec![]).unwrap();
        let t = Access::new("t", Arc::new(Storage::scalar(4.)), vec![]).unwrap();
        let a = evaluate(Expr::from(s) * Expr::from(t), Format::default()).unwrap();
        assert_eq!(a.order(), 0);
        assert_eq!(a.values().unwrap(), &[12.]);
    }

    #[test]
    fn test_compute_out_of_sequence() {
        let empty = Storage::new(vec![5].into(), "sparse".parse().unwrap()).unwrap();
        let err = compute(empty).unwrap_err();
        assert_eq!(err.code(), ErrorType::StorageNotReady);

        let b = read("b", vec![5], "sparse", &["i"], d5a());
        let a = evaluate(b, "sparse".parse().unwrap()).unwrap();
        let err = compute(a).unwrap_err();
        assert_eq!(err.code(), ErrorType::StorageNotReady);
    }

    #[test]
    fn test_empty_operand() {
        let b = read("b", vec![5], "sparse", &["i"], d5a());
        let c = read("c", vec![5], "sparse", &["i"], vec![]);

        let a = evaluate(b + c, "sparse".parse().unwrap()).unwrap();
        assert_eq!(a.dimension_index(0).unwrap(), &LevelIndex::sparse(vec![0, 2], vec![1, 4]));
        assert_eq!(a.values().unwrap(), &[1., 2.]);
    }
}

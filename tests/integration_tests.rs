//! Integration tests for the svm-engine library
//!
//! These tests verify end-to-end behaviour across training, prediction,
//! calibration and persistence.

use approx::assert_relative_eq;
use svm_engine::api::{TrainedModel, SVM};
use svm_engine::core::{Dataset, KernelType, SolveStatus, SparseVector, WorkingSetStrategy};
use svm_engine::data::{CsrMatrix, DenseMatrix};
use svm_engine::predict::vote;
use tempfile::NamedTempFile;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Three well separated clusters of `per_class` points each
fn three_clusters(per_class: usize) -> (DenseMatrix, Vec<f64>) {
    let centers = [(0.0, 0.0, 1.0), (6.0, 0.0, 2.0), (0.0, 6.0, 3.0)];
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for &(cx, cy, label) in &centers {
        for i in 0..per_class {
            let t = i as f64;
            rows.push(vec![cx + 0.3 * (t * 1.3).sin(), cy + 0.3 * (t * 0.7).cos()]);
            labels.push(label);
        }
    }
    (DenseMatrix::from_rows(&rows).unwrap(), labels)
}

fn two_clusters(per_class: usize) -> (DenseMatrix, Vec<f64>) {
    let (x, y) = three_clusters(per_class);
    let rows: Vec<Vec<f64>> = (0..2 * per_class).map(|i| x.row_slice(i).to_vec()).collect();
    (DenseMatrix::from_rows(&rows).unwrap(), y[..2 * per_class].to_vec())
}

#[test]
fn test_four_point_separable_problem() {
    init_logging();
    let x = DenseMatrix::from_rows(&[
        vec![1.0, 1.0],
        vec![2.0, 2.5],
        vec![-1.0, -1.0],
        vec![-2.0, -1.5],
    ])
    .unwrap();
    let y = vec![1.0, 1.0, -1.0, -1.0];

    for strategy in [WorkingSetStrategy::MaximalViolatingPair, WorkingSetStrategy::SecondOrder] {
        let model = SVM::new()
            .with_kernel(KernelType::Linear)
            .with_c(10.0)
            .with_working_set(strategy)
            .fit(&x, &y)
            .expect("Training should succeed");

        assert_eq!(model.predict(&x).unwrap(), y);
        assert!(model.info().n_support_vectors <= 4);
        assert!(model.report().unwrap().converged());
    }
}

#[test]
fn test_prediction_matches_one_vs_one_vote() {
    init_logging();
    let (x, y) = three_clusters(6);
    let model = SVM::new()
        .with_gamma(0.5)
        .with_n_jobs(3)
        .fit(&x, &y)
        .expect("Training should succeed");

    let labels = model.inner().labels().to_vec();
    let decisions = model.decision_function(&x).unwrap();
    let predictions = model.predict(&x).unwrap();
    for (dec, pred) in decisions.iter().zip(&predictions) {
        assert_eq!(dec.len(), 3);
        assert_eq!(labels[vote(dec, labels.len())] as f64, *pred);
    }
    assert_relative_eq!(model.accuracy(&x, &y).unwrap(), 1.0);
}

#[test]
fn test_three_way_tie_goes_to_first_class() {
    init_logging();
    // every pairwise decision value is -rho: +1, -1, +1 gives one vote each
    let text = "\
svm_type c_svc
kernel_type linear
n_features 2
nr_class 3
total_sv 1
rho -1 1 -1
label 4 8 15
nr_sv 1 0 0
SV
0 0 1:1
";
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), text).unwrap();
    let model = TrainedModel::load(file.path()).unwrap();

    let x = DenseMatrix::from_rows(&[vec![0.5, 0.5], vec![-3.0, 2.0]]).unwrap();
    assert_eq!(
        model.decision_function(&x).unwrap()[0],
        vec![1.0, -1.0, 1.0]
    );
    assert_eq!(model.predict(&x).unwrap(), vec![4.0, 4.0]);
}

#[test]
fn test_save_load_round_trip() {
    init_logging();
    let (x, y) = two_clusters(5);
    let model = SVM::new()
        .with_gamma(0.25)
        .with_c(2.0)
        .fit(&x, &y)
        .expect("Training should succeed");

    let file = NamedTempFile::new().unwrap();
    model.save(file.path()).unwrap();
    let loaded = TrainedModel::load(file.path()).unwrap();

    let (a, b) = (model.inner(), loaded.inner());
    assert_eq!(a.n_support_per_class(), b.n_support_per_class());
    assert_eq!(a.labels(), b.labels());
    assert_eq!(a.support_vectors(), b.support_vectors());
    for (ra, rb) in a.dual_coef().iter().zip(b.dual_coef()) {
        for (ca, cb) in ra.iter().zip(rb) {
            assert_relative_eq!(ca, cb, epsilon = 1e-6);
        }
    }
    for (ia, ib) in a.intercepts().iter().zip(b.intercepts()) {
        assert_relative_eq!(*ia, ib, epsilon = 1e-6);
    }
    assert_eq!(model.predict(&x).unwrap(), loaded.predict(&x).unwrap());
}

#[test]
fn test_prediction_is_idempotent() {
    init_logging();
    let (x, y) = three_clusters(5);
    let model = SVM::new().with_probability(true).fit(&x, &y).unwrap();

    assert_eq!(model.predict(&x).unwrap(), model.predict(&x).unwrap());
    assert_eq!(
        model.predict_proba(&x).unwrap(),
        model.predict_proba(&x).unwrap()
    );
    assert_eq!(
        model.decision_function(&x).unwrap(),
        model.decision_function(&x).unwrap()
    );
}

#[test]
fn test_sparse_and_dense_paths_agree() {
    init_logging();
    // 5 x 3 with two zero entries
    let dense_rows = vec![
        vec![1.0, 0.0, 2.0],
        vec![0.5, 1.5, -1.0],
        vec![-1.0, 2.0, 0.0],
        vec![2.0, -0.5, 1.0],
        vec![-1.5, 1.0, -2.0],
    ];
    let y = vec![1.0, 1.0, -1.0, 1.0, -1.0];
    let dense = DenseMatrix::from_rows(&dense_rows).unwrap();
    let rows: Vec<SparseVector> = dense_rows.iter().map(|r| SparseVector::from_dense(r)).collect();
    let sparse = CsrMatrix::from_rows(&rows, 3);
    assert_eq!(sparse.nnz(), 13);

    let svm = SVM::new().with_gamma(0.3);
    let from_dense = svm.fit(&dense, &y).unwrap();
    let from_sparse = svm.fit(&sparse, &y).unwrap();

    let reference = from_dense.decision_function(&dense).unwrap();
    for values in [
        from_dense.decision_function(&sparse).unwrap(),
        from_sparse.decision_function(&dense).unwrap(),
        from_sparse.decision_function(&sparse).unwrap(),
    ] {
        for (a, b) in reference.iter().flatten().zip(values.iter().flatten()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_sparse_width_drives_automatic_gamma() {
    init_logging();
    // 5 x 3, last column all zero
    let dense_rows = vec![
        vec![1.0, 0.5, 0.0],
        vec![0.8, 1.2, 0.0],
        vec![-1.0, -0.4, 0.0],
        vec![-0.7, -1.1, 0.0],
        vec![1.3, 0.9, 0.0],
    ];
    let y = vec![1.0, 1.0, -1.0, -1.0, 1.0];
    let dense = DenseMatrix::from_rows(&dense_rows).unwrap();
    let sparse = CsrMatrix::new(
        vec![0, 2, 4, 6, 8, 10],
        vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1],
        vec![1.0, 0.5, 0.8, 1.2, -1.0, -0.4, -0.7, -1.1, 1.3, 0.9],
        Some(3),
    )
    .unwrap();
    assert_eq!(sparse.dim(), 3);

    let svm = SVM::new();
    let from_dense = svm.fit(&dense, &y).unwrap();
    let from_sparse = svm.fit(&sparse, &y).unwrap();
    assert_eq!(from_sparse.info().n_features, 3);
    assert_eq!(
        from_sparse.inner().kernel_spec().gamma,
        from_dense.inner().kernel_spec().gamma
    );

    let reference = from_dense.decision_function(&dense).unwrap();
    for values in [
        from_sparse.decision_function(&dense).unwrap(),
        from_sparse.decision_function(&sparse).unwrap(),
    ] {
        for (a, b) in reference.iter().flatten().zip(values.iter().flatten()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_probabilities_sum_to_one() {
    init_logging();
    let (x, y) = three_clusters(10);
    let model = SVM::new()
        .with_probability(true)
        .with_random_state(7)
        .fit(&x, &y)
        .expect("Training should succeed");
    assert!(model.info().has_probability);

    let probabilities = model.predict_proba(&x).unwrap();
    assert_eq!(probabilities.len(), x.len());
    for row in &probabilities {
        assert_eq!(row.len(), 3);
        assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
        assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    let (bx, by) = two_clusters(10);
    let binary = SVM::new().with_probability(true).fit(&bx, &by).unwrap();
    for row in binary.predict_proba(&bx).unwrap() {
        assert_relative_eq!(row[0] + row[1], 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_probability_requires_calibrated_model() {
    let (x, y) = two_clusters(4);
    let model = SVM::new().fit(&x, &y).unwrap();
    assert!(model.predict_proba(&x).is_err());
}

#[test]
fn test_max_iter_is_not_fatal() {
    init_logging();
    // overlapping classes, including identical points with opposite labels
    let x = DenseMatrix::from_rows(&[
        vec![0.0, 0.0],
        vec![0.0, 0.0],
        vec![1.0, 1.0],
        vec![1.0, 1.0],
        vec![0.5, 0.4],
        vec![0.4, 0.5],
    ])
    .unwrap();
    let y = vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0];

    let model = SVM::new()
        .with_kernel(KernelType::Linear)
        .with_c(100.0)
        .with_max_iter(1)
        .fit(&x, &y)
        .expect("Hitting max_iter must still produce a model");

    assert_eq!(model.report().unwrap().status, SolveStatus::MaxIterReached);
    assert_eq!(model.predict(&x).unwrap().len(), 6);
}

#[test]
fn test_every_kernel_trains() {
    init_logging();
    let (x, y) = two_clusters(6);
    for kernel in [
        KernelType::Linear,
        KernelType::Polynomial,
        KernelType::Rbf,
        KernelType::Sigmoid,
    ] {
        let model = SVM::new()
            .with_kernel(kernel)
            .with_gamma(0.1)
            .with_coef0(0.5)
            .fit(&x, &y)
            .unwrap_or_else(|e| panic!("{kernel} kernel failed: {e}"));
        assert_eq!(model.predict(&x).unwrap().len(), x.len());
        assert_eq!(model.info().kernel, kernel);
    }
}

#[test]
fn test_precomputed_kernel_matches_linear() {
    init_logging();
    let (x, y) = two_clusters(5);
    let n = x.len();
    let gram: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| x.row(i).dot(&x.row(j))).collect())
        .collect();
    let gram = DenseMatrix::from_rows(&gram).unwrap();

    let linear = SVM::new().with_kernel(KernelType::Linear).fit(&x, &y).unwrap();
    let precomputed = SVM::new()
        .with_kernel(KernelType::Precomputed)
        .fit(&gram, &y)
        .unwrap();

    let expected = linear.decision_function(&x).unwrap();
    let actual = precomputed.decision_function(&gram).unwrap();
    for (a, b) in expected.iter().flatten().zip(actual.iter().flatten()) {
        assert_relative_eq!(a, b, epsilon = 1e-6);
    }

    let file = NamedTempFile::new().unwrap();
    precomputed.save(file.path()).unwrap();
    let loaded = TrainedModel::load(file.path()).unwrap();
    assert_eq!(loaded.predict(&gram).unwrap(), precomputed.predict(&gram).unwrap());
}

#[test]
fn test_nu_formulations() {
    init_logging();
    let (x, y) = two_clusters(6);
    let model = SVM::nu_classifier().with_nu(0.4).fit(&x, &y).unwrap();
    assert_relative_eq!(model.accuracy(&x, &y).unwrap(), 1.0);

    let xr = DenseMatrix::from_rows(&(0..12).map(|i| vec![i as f64 * 0.5]).collect::<Vec<_>>()).unwrap();
    let yr: Vec<f64> = (0..12).map(|i| 1.0 + i as f64 * 0.25).collect();
    let model = SVM::nu_regressor()
        .with_kernel(KernelType::Linear)
        .with_nu(0.5)
        .with_c(10.0)
        .fit(&xr, &yr)
        .unwrap();
    assert!(model.mean_squared_error(&xr, &yr).unwrap() < 0.05);
}

#[test]
fn test_one_class_flags_outliers() {
    init_logging();
    let (x, _) = two_clusters(8);
    let cluster: Vec<Vec<f64>> = (0..8).map(|i| x.row_slice(i).to_vec()).collect();
    let cluster = DenseMatrix::from_rows(&cluster).unwrap();

    let model = SVM::one_class()
        .with_nu(0.2)
        .with_gamma(0.5)
        .fit(&cluster, &[])
        .unwrap();

    let far = DenseMatrix::from_rows(&[vec![20.0, 20.0]]).unwrap();
    assert_eq!(model.predict(&far).unwrap(), vec![-1.0]);
    assert_eq!(model.info().labels, Vec::<i32>::new());
}

#[test]
fn test_regression_probability_sigma() {
    init_logging();
    let xr = DenseMatrix::from_rows(&(0..20).map(|i| vec![i as f64 * 0.1]).collect::<Vec<_>>()).unwrap();
    let yr: Vec<f64> = (0..20).map(|i| i as f64 * 0.2 + 0.05 * (i as f64).sin()).collect();
    let model = SVM::epsilon_regressor()
        .with_kernel(KernelType::Linear)
        .with_c(10.0)
        .with_epsilon(0.01)
        .with_probability(true)
        .fit(&xr, &yr)
        .unwrap();

    let sigma = model.svr_probability_sigma().expect("calibrated model has sigma");
    assert!(sigma.is_finite() && sigma >= 0.0);
}

#[test]
fn test_class_weights_accepted_for_known_classes() {
    let (x, y) = two_clusters(5);
    let model = SVM::new()
        .with_class_weight(1, 3.0)
        .with_class_weight(2, 0.5)
        .fit(&x, &y)
        .unwrap();
    assert_relative_eq!(model.accuracy(&x, &y).unwrap(), 1.0);

    assert!(SVM::new().with_class_weight(9, 1.0).fit(&x, &y).is_err());
}

#[test]
fn test_shrinking_agrees_with_plain_solver() {
    init_logging();
    let (x, y) = three_clusters(8);
    let plain = SVM::new().with_gamma(0.2).with_tol(1e-5).fit(&x, &y).unwrap();
    let shrunk = SVM::new()
        .with_gamma(0.2)
        .with_tol(1e-5)
        .with_shrinking(true)
        .fit(&x, &y)
        .unwrap();

    assert_eq!(plain.predict(&x).unwrap(), shrunk.predict(&x).unwrap());
    for (a, b) in plain
        .decision_function(&x)
        .unwrap()
        .iter()
        .flatten()
        .zip(shrunk.decision_function(&x).unwrap().iter().flatten())
    {
        assert_relative_eq!(a, b, epsilon = 1e-3);
    }
}

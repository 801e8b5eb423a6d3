//! Tests of the flat-array boundary layer

use approx::assert_relative_eq;
use svm_engine::binding::{
    create_model, decision_values_dense, decision_values_sparse, get_dual_coefficients,
    get_intercepts, get_support_counts_per_class, get_support_vectors, load_model,
    predict_dense, predict_probabilities, predict_sparse, save_model, train_dense, train_sparse,
    FlatParams, FAILURE, SUCCESS,
};
use svm_engine::core::{ErrorKind, SolveStatus, SvmParams, SvmType};
use tempfile::NamedTempFile;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 9 x 2 row-major matrix, three classes
fn dense_data() -> (Vec<f64>, Vec<f64>) {
    let data = vec![
        0.0, 0.0, //
        0.2, 0.1, //
        0.1, 0.3, //
        4.0, 0.0, //
        4.2, 0.2, //
        3.9, 0.1, //
        0.0, 4.0, //
        0.3, 4.1, //
        0.1, 3.8,
    ];
    let labels = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
    (data, labels)
}

/// CSR form of `dense_data`
fn sparse_data() -> (Vec<f64>, Vec<usize>, Vec<usize>) {
    let (data, _) = dense_data();
    let mut values = Vec::new();
    let mut row_ptr = vec![0];
    let mut col_idx = Vec::new();
    for row in data.chunks(2) {
        for (j, &v) in row.iter().enumerate() {
            if v != 0.0 {
                values.push(v);
                col_idx.push(j);
            }
        }
        row_ptr.push(values.len());
    }
    (values, row_ptr, col_idx)
}

fn params() -> SvmParams {
    FlatParams {
        gamma: 0.5,
        ..Default::default()
    }
    .to_params()
    .unwrap()
}

#[test]
fn test_dense_training_and_exports() {
    init_logging();
    let (data, labels) = dense_data();
    let mut handle = create_model(SvmType::CSvc.code()).unwrap();

    let summary = train_dense(&mut handle, 9, 2, &data, &labels, &params());
    assert_eq!(summary.success, SUCCESS);
    assert_eq!(summary.n_features, 2);
    assert_eq!(summary.n_classes, 3);

    let n_sv = handle.n_sv().unwrap();
    let (row_ptr, col_idx, values) = get_support_vectors(&handle).unwrap();
    assert_eq!(row_ptr.len(), n_sv + 1);
    assert_eq!(col_idx.len(), values.len());

    let coef = get_dual_coefficients(&handle, 3, n_sv).unwrap();
    assert_eq!(coef.len(), 2 * n_sv);
    assert!(get_dual_coefficients(&handle, 4, n_sv).is_err());

    assert_eq!(get_intercepts(&handle, 3).unwrap().len(), 3);
    let counts = get_support_counts_per_class(&handle, 3).unwrap();
    assert_eq!(counts.iter().sum::<usize>(), n_sv);

    let predictions = predict_dense(&mut handle, 9, 2, &data).unwrap();
    assert_eq!(predictions, labels);

    let dec = decision_values_dense(&handle, 9, 2, &data).unwrap();
    assert_eq!(dec.len(), 9 * handle.n_binary_models().unwrap());
}

#[test]
fn test_sparse_training_matches_dense() {
    init_logging();
    let (data, labels) = dense_data();
    let (values, row_ptr, col_idx) = sparse_data();

    let mut dense = create_model(0).unwrap();
    let mut sparse = create_model(0).unwrap();
    assert_eq!(train_dense(&mut dense, 9, 2, &data, &labels, &params()).success, SUCCESS);
    let summary = train_sparse(&mut sparse, 9, 2, &values, &row_ptr, &col_idx, &labels, &params());
    assert_eq!(summary.success, SUCCESS);
    assert_eq!(summary.n_classes, 3);

    let a = decision_values_dense(&dense, 9, 2, &data).unwrap();
    let b = decision_values_sparse(&sparse, 9, 2, &values, &row_ptr, &col_idx).unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert_relative_eq!(x, y, epsilon = 1e-5);
    }
    assert_eq!(
        predict_sparse(&mut sparse, 9, 2, &values, &row_ptr, &col_idx).unwrap(),
        labels
    );
}

#[test]
fn test_failed_fit_leaves_handle_empty() {
    init_logging();
    let (data, labels) = dense_data();
    let mut handle = create_model(0).unwrap();
    assert_eq!(train_dense(&mut handle, 9, 2, &data, &labels, &params()).success, SUCCESS);

    // wrong number of labels
    let summary = train_dense(&mut handle, 9, 2, &data, &labels[..5], &params());
    assert_eq!(summary.success, FAILURE);
    assert!(!handle.is_fitted());
    assert_eq!(handle.last_error().map(|e| e.kind()), Some(ErrorKind::Data));

    // unknown class weight
    let bad = FlatParams {
        weight_labels: vec![42],
        weights: vec![2.0],
        ..Default::default()
    }
    .to_params()
    .unwrap();
    let summary = train_dense(&mut handle, 9, 2, &data, &labels, &bad);
    assert_eq!(summary.success, FAILURE);
    assert_eq!(
        handle.last_error().map(|e| e.kind()),
        Some(ErrorKind::Configuration)
    );
    assert!(predict_dense(&mut handle, 9, 2, &data).is_err());
}

#[test]
fn test_max_iter_reports_success() {
    init_logging();
    let data = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
    let labels = vec![1.0, -1.0, 1.0, -1.0];
    let params = FlatParams {
        kernel: 0,
        max_iter: 1,
        c: 50.0,
        ..Default::default()
    }
    .to_params()
    .unwrap();

    let mut handle = create_model(0).unwrap();
    let summary = train_dense(&mut handle, 4, 2, &data, &labels, &params);
    assert_eq!(summary.success, SUCCESS);
    assert_eq!(
        handle.report().map(|r| r.status),
        Some(SolveStatus::MaxIterReached)
    );
}

#[test]
fn test_probabilities_follow_last_prediction() {
    init_logging();
    let (data, labels) = dense_data();
    let mut handle = create_model(0).unwrap();
    let params = FlatParams {
        gamma: 0.5,
        probability: true,
        ..Default::default()
    }
    .to_params()
    .unwrap();
    assert_eq!(train_dense(&mut handle, 9, 2, &data, &labels, &params).success, SUCCESS);
    assert!(predict_probabilities(&handle).is_err());

    predict_dense(&mut handle, 3, 2, &data[..6]).unwrap();
    let probabilities = predict_probabilities(&handle).unwrap();
    assert_eq!(probabilities.len(), 3 * 3);
    for row in probabilities.chunks(3) {
        assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_probabilities_require_calibration() {
    let (data, labels) = dense_data();
    let mut handle = create_model(0).unwrap();
    train_dense(&mut handle, 9, 2, &data, &labels, &params());
    predict_dense(&mut handle, 9, 2, &data).unwrap();
    let err = predict_probabilities(&handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_dense_predict_checks_feature_count() {
    let (data, labels) = dense_data();
    let mut handle = create_model(0).unwrap();
    train_dense(&mut handle, 9, 2, &data, &labels, &params());

    let err = predict_dense(&mut handle, 18, 1, &data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Data);

    // an extra all-zero column changes nothing
    let wide: Vec<f64> = data.chunks(2).flat_map(|r| [r[0], r[1], 0.0]).collect();
    assert_eq!(predict_dense(&mut handle, 9, 3, &wide).unwrap(), labels);
    assert_eq!(
        decision_values_dense(&handle, 9, 3, &wide).unwrap(),
        decision_values_dense(&handle, 9, 2, &data).unwrap()
    );
}

#[test]
fn test_trailing_zero_column_keeps_feature_count() {
    init_logging();
    // 5 x 3, last column all zero, automatic gamma
    let data = vec![
        1.0, 0.5, 0.0, //
        0.8, 1.2, 0.0, //
        -1.0, -0.4, 0.0, //
        -0.7, -1.1, 0.0, //
        1.3, 0.9, 0.0,
    ];
    let labels = vec![1.0, 1.0, -1.0, -1.0, 1.0];
    let values = vec![1.0, 0.5, 0.8, 1.2, -1.0, -0.4, -0.7, -1.1, 1.3, 0.9];
    let row_ptr = vec![0, 2, 4, 6, 8, 10];
    let col_idx = vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
    let params = FlatParams::default().to_params().unwrap();

    let mut dense = create_model(0).unwrap();
    let mut sparse = create_model(0).unwrap();
    let dense_summary = train_dense(&mut dense, 5, 3, &data, &labels, &params);
    let sparse_summary = train_sparse(
        &mut sparse, 5, 3, &values, &row_ptr, &col_idx, &labels, &params,
    );
    assert_eq!(dense_summary.success, SUCCESS);
    assert_eq!(sparse_summary, dense_summary);
    assert_eq!(sparse_summary.n_features, 3);
    assert_relative_eq!(
        sparse.model().unwrap().kernel_spec().gamma,
        1.0 / 3.0,
        epsilon = 1e-15
    );

    let reference = decision_values_dense(&dense, 5, 3, &data).unwrap();
    for values in [
        decision_values_dense(&sparse, 5, 3, &data).unwrap(),
        decision_values_sparse(&sparse, 5, 3, &values, &row_ptr, &col_idx).unwrap(),
        decision_values_sparse(&dense, 5, 3, &values, &row_ptr, &col_idx).unwrap(),
    ] {
        assert_eq!(values.len(), reference.len());
        for (a, b) in reference.iter().zip(&values) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    // a column count narrower than the stored indices is malformed input
    let err = decision_values_sparse(&sparse, 5, 1, &values, &row_ptr, &col_idx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Data);
}

#[test]
fn test_regression_exports_and_refusals() {
    init_logging();
    let data: Vec<f64> = (0..6).map(|i| i as f64).collect();
    let targets: Vec<f64> = data.iter().map(|x| 2.0 * x + 1.0).collect();
    let params = FlatParams {
        kernel: 0,
        c: 10.0,
        epsilon: 0.05,
        ..Default::default()
    }
    .to_params()
    .unwrap();

    let mut handle = create_model(SvmType::EpsilonSvr.code()).unwrap();
    let summary = train_dense(&mut handle, 6, 1, &data, &targets, &params);
    assert_eq!(summary.success, SUCCESS);
    assert_eq!(summary.n_classes, 2);
    assert_eq!(get_support_counts_per_class(&handle, 2).unwrap(), vec![0, 0]);
    assert_eq!(get_intercepts(&handle, 1).unwrap().len(), 1);

    let err = decision_values_dense(&handle, 6, 1, &data).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let predictions = predict_dense(&mut handle, 6, 1, &data).unwrap();
    for (p, t) in predictions.iter().zip(&targets) {
        assert!((p - t).abs() < 0.2);
    }
}

#[test]
fn test_save_and_load_through_handles() {
    init_logging();
    let (data, labels) = dense_data();
    let mut trained = create_model(0).unwrap();
    train_dense(&mut trained, 9, 2, &data, &labels, &params());

    let file = NamedTempFile::new().unwrap();
    save_model(&trained, file.path()).unwrap();

    let mut restored = create_model(0).unwrap();
    load_model(&mut restored, file.path()).unwrap();
    assert_eq!(
        get_dual_coefficients(&restored, 3, trained.n_sv().unwrap()).unwrap(),
        get_dual_coefficients(&trained, 3, trained.n_sv().unwrap()).unwrap()
    );
    assert_eq!(
        get_intercepts(&restored, 3).unwrap(),
        get_intercepts(&trained, 3).unwrap()
    );
    assert_eq!(
        predict_dense(&mut restored, 9, 2, &data).unwrap(),
        predict_dense(&mut trained, 9, 2, &data).unwrap()
    );

    // a failed load keeps the current model
    let dir = tempfile::tempdir().unwrap();
    assert!(load_model(&mut restored, dir.path().join("nope.model")).is_err());
    assert!(restored.is_fitted());

    let empty = create_model(0).unwrap();
    assert!(save_model(&empty, file.path()).is_err());
}

#[test]
fn test_one_class_handle() {
    let (data, _) = dense_data();
    let mut handle = create_model(SvmType::OneClass.code()).unwrap();
    let params = FlatParams {
        nu: 0.3,
        gamma: 0.5,
        ..Default::default()
    }
    .to_params()
    .unwrap();
    let summary = train_dense(&mut handle, 3, 2, &data[..6], &[], &params);
    assert_eq!(summary.success, SUCCESS);

    let far = [30.0, 30.0];
    assert_eq!(predict_dense(&mut handle, 1, 2, &far).unwrap(), vec![-1.0]);
    assert_eq!(decision_values_dense(&handle, 1, 2, &far).unwrap().len(), 1);
}

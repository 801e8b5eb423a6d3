//! Model serialization and persistence
//!
//! Models are stored as plain text: `key value...` header lines, a line
//! holding `SV`, then one line per support vector with its dual
//! coefficients followed by `index:value` pairs. Indices are written
//! 1-based. Support vectors of a precomputed-kernel model are written as
//! `0:<training row + 1>`. Floats use Rust's shortest round-trip
//! formatting, so a saved model loads back bit-for-bit.

use crate::core::{KernelType, Result, SVMError, SparseVector, SvmType};
use crate::model::{FittedModel, KernelSpec};
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

fn join<T: std::fmt::Debug>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write `model` in the text model format
pub fn write_model<W: Write>(model: &FittedModel, mut writer: W) -> Result<()> {
    let spec = model.kernel_spec();
    writeln!(writer, "svm_type {}", model.svm_type())?;
    writeln!(writer, "kernel_type {}", spec.kernel)?;
    if spec.kernel == KernelType::Polynomial {
        writeln!(writer, "degree {}", spec.degree)?;
    }
    if spec.kernel.uses_gamma() {
        writeln!(writer, "gamma {:?}", spec.gamma)?;
    }
    if spec.kernel.uses_coef0() {
        writeln!(writer, "coef0 {:?}", spec.coef0)?;
    }
    writeln!(writer, "n_features {}", model.n_features())?;
    writeln!(writer, "nr_class {}", model.n_classes())?;
    writeln!(writer, "total_sv {}", model.n_sv())?;
    writeln!(writer, "rho {}", join(model.rho()))?;

    let classification = model.svm_type().is_classification();
    if classification {
        writeln!(writer, "label {}", join(model.labels()))?;
    }
    if model.has_probability() {
        writeln!(writer, "probA {}", join(model.prob_a()))?;
        if classification {
            writeln!(writer, "probB {}", join(model.prob_b()))?;
        }
    }
    if classification {
        writeln!(writer, "nr_sv {}", join(model.n_support_per_class()))?;
    }

    writeln!(writer, "SV")?;
    let precomputed = spec.kernel == KernelType::Precomputed;
    let indices = model.support_indices();
    for (s, sv) in model.support_vectors().iter().enumerate() {
        let mut line = model
            .dual_coef()
            .iter()
            .map(|row| format!("{:?}", row[s]))
            .collect::<Vec<_>>()
            .join(" ");
        if precomputed {
            let id = indices.map(|ids| ids[s]).ok_or_else(|| {
                SVMError::SerializationError(
                    "precomputed model without support vector rows".to_string(),
                )
            })?;
            line.push_str(&format!(" 0:{}", id + 1));
        } else {
            for (&idx, &value) in sv.indices.iter().zip(&sv.values) {
                line.push_str(&format!(" {}:{value:?}", idx + 1));
            }
        }
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

/// Header fields collected before the `SV` line
#[derive(Debug, Default)]
struct Header {
    svm_type: Option<SvmType>,
    kernel: Option<KernelType>,
    degree: Option<u32>,
    gamma: Option<f64>,
    coef0: Option<f64>,
    n_features: Option<usize>,
    nr_class: Option<usize>,
    total_sv: Option<usize>,
    rho: Option<Vec<f64>>,
    labels: Option<Vec<i32>>,
    prob_a: Option<Vec<f64>>,
    prob_b: Option<Vec<f64>>,
    nr_sv: Option<Vec<usize>>,
}

fn parse_error(line: usize, message: impl std::fmt::Display) -> SVMError {
    SVMError::ParseError(format!("line {line}: {message}"))
}

fn parse_one<T: FromStr>(line: usize, key: &str, tokens: &[&str]) -> Result<T> {
    match tokens {
        [token] => token
            .parse()
            .map_err(|_| parse_error(line, format!("invalid value '{token}' for {key}"))),
        _ => Err(parse_error(
            line,
            format!("{key} takes one value, got {}", tokens.len()),
        )),
    }
}

fn parse_many<T: FromStr>(line: usize, key: &str, tokens: &[&str]) -> Result<Vec<T>> {
    tokens
        .iter()
        .map(|token| {
            token
                .parse()
                .map_err(|_| parse_error(line, format!("invalid value '{token}' for {key}")))
        })
        .collect()
}

impl Header {
    fn set(&mut self, line: usize, key: &str, tokens: &[&str]) -> Result<()> {
        match key {
            "svm_type" => self.svm_type = Some(parse_one(line, key, tokens)?),
            "kernel_type" => self.kernel = Some(parse_one(line, key, tokens)?),
            "degree" => self.degree = Some(parse_one(line, key, tokens)?),
            "gamma" => self.gamma = Some(parse_one(line, key, tokens)?),
            "coef0" => self.coef0 = Some(parse_one(line, key, tokens)?),
            "n_features" => self.n_features = Some(parse_one(line, key, tokens)?),
            "nr_class" => self.nr_class = Some(parse_one(line, key, tokens)?),
            "total_sv" => self.total_sv = Some(parse_one(line, key, tokens)?),
            "rho" => self.rho = Some(parse_many(line, key, tokens)?),
            "label" => self.labels = Some(parse_many(line, key, tokens)?),
            "probA" => self.prob_a = Some(parse_many(line, key, tokens)?),
            "probB" => self.prob_b = Some(parse_many(line, key, tokens)?),
            "nr_sv" => self.nr_sv = Some(parse_many(line, key, tokens)?),
            _ => return Err(parse_error(line, format!("unknown key '{key}'"))),
        }
        Ok(())
    }
}

fn missing(key: &str) -> SVMError {
    SVMError::ParseError(format!("missing '{key}' in model header"))
}

fn check_len(key: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(SVMError::ParseError(format!(
            "{key} has {actual} values, expected {expected}"
        )));
    }
    Ok(())
}

/// One support vector line: coefficients, then the row or training id
struct SvLine {
    coef: Vec<f64>,
    row: SparseVector,
    id: Option<usize>,
}

fn parse_sv_line(line_no: usize, line: &str, n_coef: usize, precomputed: bool) -> Result<SvLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < n_coef {
        return Err(parse_error(
            line_no,
            format!("expected {n_coef} coefficients, got {}", tokens.len()),
        ));
    }
    let coef = parse_many(line_no, "coefficient", &tokens[..n_coef])?;

    let mut indices = Vec::new();
    let mut values = Vec::new();
    for token in &tokens[n_coef..] {
        let (idx, value) = token
            .split_once(':')
            .ok_or_else(|| parse_error(line_no, format!("malformed feature '{token}'")))?;
        let idx: usize = idx
            .parse()
            .map_err(|_| parse_error(line_no, format!("malformed feature index in '{token}'")))?;
        let value: f64 = value
            .parse()
            .map_err(|_| parse_error(line_no, format!("malformed feature value in '{token}'")))?;
        indices.push(idx);
        values.push(value);
    }

    if precomputed {
        return match (indices.as_slice(), values.as_slice()) {
            ([0], [id]) if id.fract() == 0.0 && *id >= 1.0 => Ok(SvLine {
                coef,
                row: SparseVector::empty(),
                id: Some(*id as usize - 1),
            }),
            _ => Err(parse_error(
                line_no,
                "precomputed support vector must be a single 0:<row> entry",
            )),
        };
    }

    if indices.contains(&0) {
        return Err(parse_error(line_no, "feature indices are 1-based"));
    }
    let indices = indices.into_iter().map(|i| i - 1).collect();
    let row = SparseVector::try_from_sorted(indices, values)
        .map_err(|e| parse_error(line_no, e))?;
    Ok(SvLine {
        coef,
        row,
        id: None,
    })
}

/// Read a model written by [`write_model`]
///
/// Header keys may come in any order. A missing `n_features` is inferred
/// from the largest feature index.
pub fn read_model<R: BufRead>(reader: R) -> Result<FittedModel> {
    let mut lines = reader.lines().enumerate();

    let mut header = Header::default();
    let mut saw_sv = false;
    for (n, line) in lines.by_ref() {
        let line = line?;
        let line_no = n + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.split_first() {
            None => continue,
            Some((&"SV", [])) => {
                saw_sv = true;
                break;
            }
            Some((key, values)) => header.set(line_no, key, values)?,
        }
    }
    if !saw_sv {
        return Err(missing("SV"));
    }

    let svm_type = header.svm_type.ok_or_else(|| missing("svm_type"))?;
    let kernel = header.kernel.ok_or_else(|| missing("kernel_type"))?;
    let nr_class = header.nr_class.ok_or_else(|| missing("nr_class"))?;
    let total_sv = header.total_sv.ok_or_else(|| missing("total_sv"))?;
    let rho = header.rho.ok_or_else(|| missing("rho"))?;
    let gamma = match header.gamma {
        Some(g) => g,
        None if kernel.uses_gamma() => return Err(missing("gamma")),
        None => 0.0,
    };

    let classification = svm_type.is_classification();
    if nr_class < 2 {
        return Err(SVMError::ParseError(format!(
            "nr_class must be at least 2, got {nr_class}"
        )));
    }
    let n_models = if classification {
        nr_class * (nr_class - 1) / 2
    } else {
        1
    };
    check_len("rho", rho.len(), n_models)?;

    let (labels, n_sv_per_class) = if classification {
        let labels = header.labels.ok_or_else(|| missing("label"))?;
        let nr_sv = header.nr_sv.ok_or_else(|| missing("nr_sv"))?;
        check_len("label", labels.len(), nr_class)?;
        check_len("nr_sv", nr_sv.len(), nr_class)?;
        if nr_sv.iter().sum::<usize>() != total_sv {
            return Err(SVMError::ParseError(format!(
                "nr_sv adds up to {}, but total_sv is {total_sv}",
                nr_sv.iter().sum::<usize>()
            )));
        }
        (labels, nr_sv)
    } else {
        (Vec::new(), Vec::new())
    };

    let prob_a = header.prob_a.unwrap_or_default();
    let prob_b = header.prob_b.unwrap_or_default();
    if !prob_a.is_empty() {
        check_len("probA", prob_a.len(), n_models)?;
        if classification {
            check_len("probB", prob_b.len(), n_models)?;
        }
    }

    let precomputed = kernel == KernelType::Precomputed;
    let n_coef = nr_class - 1;
    let mut sv_coef = vec![Vec::with_capacity(total_sv); n_coef];
    let mut support_vectors = Vec::with_capacity(total_sv);
    let mut sv_indices = Vec::new();
    for (n, line) in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if support_vectors.len() == total_sv {
            return Err(parse_error(n + 1, "more support vectors than total_sv"));
        }
        let sv = parse_sv_line(n + 1, &line, n_coef, precomputed)?;
        for (row, c) in sv_coef.iter_mut().zip(sv.coef) {
            row.push(c);
        }
        sv_indices.extend(sv.id);
        support_vectors.push(sv.row);
    }
    check_len("SV section", support_vectors.len(), total_sv)?;

    let widest = if precomputed {
        sv_indices.iter().max().map_or(0, |m| m + 1)
    } else {
        support_vectors
            .iter()
            .filter_map(SparseVector::max_index)
            .max()
            .map_or(0, |m| m + 1)
    };
    let n_features = match header.n_features {
        Some(n) if n < widest => {
            return Err(SVMError::ParseError(format!(
                "support vectors use {widest} features, but n_features is {n}"
            )))
        }
        Some(n) => n,
        None => widest,
    };

    Ok(FittedModel {
        svm_type,
        kernel: KernelSpec {
            kernel,
            degree: header.degree.unwrap_or(3),
            gamma,
            coef0: header.coef0.unwrap_or(0.0),
        },
        n_features,
        labels,
        n_sv_per_class,
        support_vectors,
        sv_indices,
        sv_coef,
        rho,
        prob_a,
        prob_b,
    })
}

/// Save a model to `path`
pub fn save_model<P: AsRef<Path>>(model: &FittedModel, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_model(model, &mut writer)?;
    writer.flush()?;
    info!(
        "Saved {} model with {} support vectors to {}",
        model.svm_type(),
        model.n_sv(),
        path.display()
    );
    Ok(())
}

/// Load a model from `path`
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<FittedModel> {
    let path = path.as_ref();
    let model = read_model(BufReader::new(File::open(path)?))?;
    info!(
        "Loaded {} model with {} support vectors from {}",
        model.svm_type(),
        model.n_sv(),
        path.display()
    );
    Ok(model)
}

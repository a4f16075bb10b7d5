//! JSON persistence of value tables, weight vectors and policies.
//!
//! Tables are stored as a flat object mapping the JSON encoding of each state
//! (or `[state, action]` pair) to its value. Weight vectors are stored as
//! `{"weights": [...]}`. Files are written to a temporary sibling first and
//! renamed into place, so a failed write never clobbers an earlier save.
//!
//! Loading a file that does not exist returns `Ok(false)` and leaves the
//! target untouched; a malformed document or key is an error.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gpi::approximator::FunctionApproximator;
use crate::gpi::error::Result;
use crate::gpi::mdp::{decode_key, encode_key, Action, State};
use crate::gpi::policy::DeterministicPolicy;
use crate::gpi::storage::TabularValues;

/// On-disk form of a weight vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsFile {
    /// The weights in feature order.
    pub weights: Vec<f64>,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` and atomically replace `path` with it.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    info!(path = %path.display(), bytes = json.len(), "saved");
    Ok(())
}

/// Read `path`, or `None` if it does not exist.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "no saved file, starting fresh");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Save every Q(s, a) entry of `table`.
pub fn save_q_values<S: State, A: Action, P: AsRef<Path>>(
    table: &TabularValues<S, A>,
    path: P,
) -> Result<()> {
    let mut out = BTreeMap::new();
    for ((state, action), value) in table.q_table() {
        out.insert(encode_key(&(state, action))?, *value);
    }
    write_json(path.as_ref(), &out)
}

/// Save every V(s) entry of `table`.
pub fn save_v_values<S: State, A: Action, P: AsRef<Path>>(
    table: &TabularValues<S, A>,
    path: P,
) -> Result<()> {
    let mut out = BTreeMap::new();
    for (state, value) in table.v_table() {
        out.insert(encode_key(state)?, *value);
    }
    write_json(path.as_ref(), &out)
}

/// Merge saved Q values into `table`. Returns `false` if the file is missing.
pub fn load_q_values<S: State, A: Action, P: AsRef<Path>>(
    table: &mut TabularValues<S, A>,
    path: P,
) -> Result<bool> {
    let Some(content) = read_optional(path.as_ref())? else {
        return Ok(false);
    };
    let raw: BTreeMap<String, f64> = serde_json::from_str(&content)?;

    // Decode everything before touching the table.
    let mut entries = Vec::with_capacity(raw.len());
    for (key, value) in raw {
        let (state, action): (S, A) = decode_key(&key)?;
        entries.push((state, action, value));
    }
    let count = entries.len();
    for (state, action, value) in entries {
        table.set_q(state, action, value);
    }

    info!(path = %path.as_ref().display(), entries = count, "loaded action values");
    Ok(true)
}

/// Merge saved V values into `table`. Returns `false` if the file is missing.
pub fn load_v_values<S: State, A: Action, P: AsRef<Path>>(
    table: &mut TabularValues<S, A>,
    path: P,
) -> Result<bool> {
    let Some(content) = read_optional(path.as_ref())? else {
        return Ok(false);
    };
    let raw: BTreeMap<String, f64> = serde_json::from_str(&content)?;

    let mut entries = Vec::with_capacity(raw.len());
    for (key, value) in raw {
        let state: S = decode_key(&key)?;
        entries.push((state, value));
    }
    let count = entries.len();
    for (state, value) in entries {
        table.set_v(state, value);
    }

    info!(path = %path.as_ref().display(), entries = count, "loaded state values");
    Ok(true)
}

/// Save the weight vector of `approximator`.
pub fn save_weights<X, F, P>(approximator: &F, path: P) -> Result<()>
where
    F: FunctionApproximator<X> + ?Sized,
    P: AsRef<Path>,
{
    let file = WeightsFile {
        weights: approximator.weights().to_vec(),
    };
    write_json(path.as_ref(), &file)
}

/// Restore saved weights into `approximator`. Returns `false` if the file
/// is missing.
///
/// # Errors
/// [`GpiError::InvalidArgument`](crate::gpi::GpiError::InvalidArgument) if the
/// saved vector has a different length.
pub fn load_weights<X, F, P>(approximator: &mut F, path: P) -> Result<bool>
where
    F: FunctionApproximator<X> + ?Sized,
    P: AsRef<Path>,
{
    let Some(content) = read_optional(path.as_ref())? else {
        return Ok(false);
    };
    let file: WeightsFile = serde_json::from_str(&content)?;
    approximator.set_weights(file.weights)?;
    Ok(true)
}

/// Save a state-to-action mapping as `{state: action}`.
pub fn save_policy<S: State, A: Action, P: AsRef<Path>>(
    policy: &DeterministicPolicy<S, A>,
    path: P,
) -> Result<()> {
    let mut out = BTreeMap::new();
    for (state, action) in policy.mapping() {
        out.insert(encode_key(state)?, serde_json::to_value(action)?);
    }
    write_json(path.as_ref(), &out)
}

/// Load a mapping written by [`save_policy`]. Returns `None` if the file is
/// missing.
pub fn load_policy<S: State, A: Action, P: AsRef<Path>>(
    path: P,
) -> Result<Option<DeterministicPolicy<S, A>>> {
    let Some(content) = read_optional(path.as_ref())? else {
        return Ok(None);
    };
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)?;

    let mut policy = DeterministicPolicy::new();
    for (key, action) in raw {
        let state: S = decode_key(&key)?;
        policy.set(state, serde_json::from_value(action)?);
    }
    Ok(Some(policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpi::approximator::LinearFunctionApproximator;
    use crate::gpi::error::GpiError;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gpi-solver-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_q_round_trip_is_exact() {
        let dir = scratch_dir("q");
        let path = dir.join("q.json");

        let mut table: TabularValues<(usize, usize), (i32, i32)> = TabularValues::new();
        table.set_q((3, 0), (0, 1), -7.712320754503901);
        table.set_q((3, 0), (-1, 0), 0.1 + 0.2);
        table.set_q((6, 9), (0, -1), f64::MIN_POSITIVE);
        save_q_values(&table, &path).unwrap();

        let mut restored = TabularValues::new();
        assert!(load_q_values(&mut restored, &path).unwrap());
        assert_eq!(restored.num_pairs(), 3);
        for ((s, a), v) in table.q_table() {
            assert_eq!(restored.get_q(s, a).unwrap(), *v, "Q({:?}, {:?})", s, a);
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_v_round_trip_with_composite_state() {
        let dir = scratch_dir("v");
        let path = dir.join("nested").join("v.json");

        let mut table: TabularValues<(u8, u8, bool), bool> = TabularValues::new();
        table.set_v((20, 10, false), 0.4417);
        table.set_v((13, 1, true), -1.0 / 3.0);
        save_v_values(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"[20,10,false]\""), "{}", content);
        assert!(!temp_path(&path).exists());

        let mut restored: TabularValues<(u8, u8, bool), bool> = TabularValues::new();
        assert!(load_v_values(&mut restored, &path).unwrap());
        assert_eq!(restored.get_v(&(13, 1, true)).unwrap(), -1.0 / 3.0);
        assert_eq!(restored.get_v(&(20, 10, false)).unwrap(), 0.4417);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = scratch_dir("missing");
        let mut table: TabularValues<u8, u8> = TabularValues::new();
        assert!(!load_q_values(&mut table, dir.join("nope.json")).unwrap());
        assert!(!load_v_values(&mut table, dir.join("nope.json")).unwrap());
        assert_eq!(table.num_pairs(), 0);

        let mut fa = LinearFunctionApproximator::new(2, |x: &u8| vec![1.0, *x as f64]);
        assert!(!load_weights(&mut fa, dir.join("nope.json")).unwrap());
        assert!(load_policy::<u8, u8, _>(dir.join("nope.json")).unwrap().is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_malformed_input_fails_loudly() {
        let dir = scratch_dir("malformed");
        let mut table: TabularValues<(usize, usize), u8> = TabularValues::new();

        let bad_key = dir.join("bad_key.json");
        fs::write(&bad_key, r#"{"(3, 0),1": 1.5}"#).unwrap();
        let err = load_q_values(&mut table, &bad_key).unwrap_err();
        assert!(matches!(err, GpiError::MalformedKey { .. }), "{:?}", err);
        assert_eq!(table.num_pairs(), 0, "nothing is applied on failure");

        let bad_doc = dir.join("bad_doc.json");
        fs::write(&bad_doc, "{\"[[3,0],1]\": ").unwrap();
        assert!(matches!(
            load_q_values(&mut table, &bad_doc),
            Err(GpiError::Json(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_weights_round_trip_and_size_check() {
        let dir = scratch_dir("weights");
        let path = dir.join("weights.json");

        let fa = LinearFunctionApproximator::with_random_weights(5, 99, |x: &u8| {
            vec![*x as f64; 5]
        });
        save_weights(&fa, &path).unwrap();

        let mut restored = LinearFunctionApproximator::new(5, |x: &u8| vec![*x as f64; 5]);
        assert!(load_weights(&mut restored, &path).unwrap());
        assert_eq!(restored.weights(), fa.weights());

        let mut wrong = LinearFunctionApproximator::new(4, |x: &u8| vec![*x as f64; 4]);
        assert!(matches!(
            load_weights(&mut wrong, &path),
            Err(GpiError::InvalidArgument(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_policy_round_trip() {
        let dir = scratch_dir("policy");
        let path = dir.join("policy.json");

        let mut policy: DeterministicPolicy<(u8, u8, bool), bool> = DeterministicPolicy::new();
        policy.set((20, 5, false), false);
        policy.set((12, 2, true), true);
        save_policy(&policy, &path).unwrap();

        let restored = load_policy::<(u8, u8, bool), bool, _>(&path).unwrap().unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(&(12, 2, true)), Some(&true));

        fs::remove_dir_all(&dir).unwrap();
    }
}

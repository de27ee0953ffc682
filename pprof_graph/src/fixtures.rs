//! Synthetic profiles for unit tests.

use crate::Profile;
use serde_json::json;
use std::collections::BTreeSet;

/// Build a profile from `(stack, value)` pairs.
///
/// Stacks list function ids outermost first. Function `n` is named `fn{n}`,
/// lives in `file{n % 2}.go`, starts at line `n * 10` and every frame of it
/// executes line `n * 10 + 1`. Each function gets a location with the same id.
/// Samples carry two values: `[1, value]` for `samples`/`count` and
/// `cpu`/`nanoseconds`.
pub fn profile(stacks: &[(&[u64], i64)]) -> Profile {
    profile_with_unit(stacks, "nanoseconds")
}

/// Like [`profile`] with a custom unit for the second sample type.
pub fn profile_with_unit(stacks: &[(&[u64], i64)], unit: &str) -> Profile {
    let ids: BTreeSet<u64> = stacks.iter().flat_map(|(s, _)| s.iter().copied()).collect();

    let functions: Vec<_> = ids
        .iter()
        .map(|&id| {
            json!({
                "ID": id,
                "Name": format!("fn{}", id),
                "Filename": format!("file{}.go", id % 2),
                "StartLine": id * 10,
            })
        })
        .collect();

    let locations: Vec<_> = ids
        .iter()
        .map(|&id| json!({"ID": id, "Line": [{"Function": id, "Line": id * 10 + 1}]}))
        .collect();

    let samples: Vec<_> = stacks
        .iter()
        .map(|(stack, value)| json!({"Location": stack, "Value": [1, value]}))
        .collect();

    let data = json!({
        "SampleType": [
            {"Type": "samples", "Unit": "count"},
            {"Type": "cpu", "Unit": unit}
        ],
        "DefaultSampleType": "cpu",
        "Function": functions,
        "Location": locations,
        "Sample": samples,
    });

    Profile::from_slice(data.to_string().as_bytes()).unwrap()
}

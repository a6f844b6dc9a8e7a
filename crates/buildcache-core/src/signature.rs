//! Signature composition: combining per-domain hashes into the keys used
//! to look up stages and results in the persistent store.

use sha2::{Digest, Sha256};

/// `stageSignature(projectSig, depSig) = projectSig + "-" + depSig`.
#[must_use]
pub fn stage_signature(project_sig: &str, dep_sig: &str) -> String {
    format!("{project_sig}-{dep_sig}")
}

/// `combinedDepSignature(depSigs) = sha256(depSigs.join(""))`.
#[must_use]
pub fn combined_dep_signature(dep_sigs: &[String]) -> String {
    let mut hasher = Sha256::new();
    for sig in dep_sigs {
        hasher.update(sig.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// `resultSignature(projectSig, depSigs) = projectSig + "-" + combinedDepSignature(depSigs)`.
#[must_use]
pub fn result_signature(project_sig: &str, dep_sigs: &[String]) -> String {
    stage_signature(project_sig, &combined_dep_signature(dep_sigs))
}

/// Cartesian product of candidate signatures across an arbitrary number of
/// per-task signature lists, each list already expanded to include both
/// "current" and "delta" candidates by the caller. Used by
/// `findResultCache` (over dependency signatures per task) and by
/// `prepareTaskExecutionAndValidateCache` (over project/dependency
/// signature candidates for one stage).
///
/// Over-search bound: candidate explosion is `product(len(list) for list
/// in lists)`. We cap the total number of combinations produced; beyond
/// the cap, the remaining combinations are dropped and a `tracing::warn!`
/// is emitted, rather than letting a pathological fan-out of request-graph
/// nodes stall cache lookup. 4096 keeps worst-case lookup well under a
/// millisecond of pure composition work even for projects with a dozen
/// tasks each carrying a handful of differential-build nodes.
pub const MAX_CANDIDATE_COMBINATIONS: usize = 4096;

/// Build the cartesian product of `lists`, each element joined into a
/// single combination and passed through `combine`.
pub fn cartesian_product<T: Clone>(lists: &[Vec<T>], combine: impl Fn(&[T]) -> String) -> Vec<String> {
    if lists.is_empty() {
        return Vec::new();
    }
    if lists.iter().any(Vec::is_empty) {
        return Vec::new();
    }

    let total: usize = lists.iter().map(Vec::len).product();
    if total > MAX_CANDIDATE_COMBINATIONS {
        tracing::warn!(total, cap = MAX_CANDIDATE_COMBINATIONS, "candidate signature combinations exceed cap, truncating search");
    }

    let mut combinations: Vec<Vec<T>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::new();
        'outer: for existing in &combinations {
            for item in list {
                if next.len() >= MAX_CANDIDATE_COMBINATIONS {
                    break 'outer;
                }
                let mut combo = existing.clone();
                combo.push(item.clone());
                next.push(combo);
            }
        }
        combinations = next;
    }

    combinations.iter().map(|combo| combine(combo)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_signature_concatenates_with_dash() {
        assert_eq!(stage_signature("abc", "def"), "abc-def");
    }

    #[test]
    fn combined_dep_signature_is_order_sensitive_concatenation() {
        let a = combined_dep_signature(&["one".into(), "two".into()]);
        let b = combined_dep_signature(&["onetwo".into()]);
        assert_eq!(a, b);
        let c = combined_dep_signature(&["two".into(), "one".into()]);
        assert_ne!(a, c);
    }

    #[test]
    fn cartesian_product_combines_every_pairing() {
        let lists = vec![vec!["p1".to_string(), "p2".to_string()], vec!["d1".to_string()]];
        let combos = cartesian_product(&lists, |combo| combo.join("-"));
        assert_eq!(combos.len(), 2);
        assert!(combos.contains(&"p1-d1".to_string()));
        assert!(combos.contains(&"p2-d1".to_string()));
    }

    #[test]
    fn cartesian_product_empty_list_yields_no_candidates() {
        let lists: Vec<Vec<String>> = vec![vec!["p1".to_string()], vec![]];
        assert!(cartesian_product(&lists, |combo| combo.join("-")).is_empty());
    }
}

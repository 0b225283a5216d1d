//! Deployment planning.
//!
//! Orders the artifact registry into a creation sequence that respects every
//! address dependency, so each artifact is created only after everything its
//! constructor or wiring references. Ties are broken by declaration order,
//! which keeps the plan reproducible across runs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;

use crate::artifact::{ArtifactSpec, WiringAction};

/// The artifact reference graph is not a DAG. Fatal: the registry must be
/// fixed by the operator, no transaction is ever submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle among artifacts: {}", .participants.join(" -> "))]
pub struct CycleError {
    /// Artifacts that sit on a cycle, in declaration order.
    pub participants: Vec<String>,
}

/// Order the given specs into a deployment sequence.
///
/// Returns the specs in an order where every artifact is preceded by all
/// artifacts it references. Artifacts with no unmet dependencies keep their
/// declaration order relative to each other.
pub fn plan(specs: &[ArtifactSpec]) -> Result<Vec<&ArtifactSpec>, CycleError> {
    let index: BTreeMap<&str, usize> = specs
        .iter()
        .enumerate()
        .map(|(i, spec)| (spec.name.as_str(), i))
        .collect();

    // Unmet in-set dependencies per spec. References to names outside the
    // registry cannot influence ordering and are resolved (or rejected) at
    // deployment time instead.
    let mut remaining: Vec<BTreeSet<usize>> = specs
        .iter()
        .map(|spec| {
            spec.dependencies()
                .iter()
                .filter_map(|dep| {
                    let found = index.get(dep).copied();
                    if found.is_none() {
                        tracing::warn!(
                            artifact = %spec.name,
                            reference = %dep,
                            "Artifact references a name outside the registry"
                        );
                    }
                    found
                })
                .collect()
        })
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    for (i, deps) in remaining.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(i);
        }
    }

    // Kahn's algorithm with a FIFO frontier seeded in declaration order.
    let mut queue: VecDeque<usize> = (0..specs.len())
        .filter(|&i| remaining[i].is_empty())
        .collect();
    let mut placed = vec![false; specs.len()];
    let mut order = Vec::with_capacity(specs.len());

    while let Some(i) = queue.pop_front() {
        if placed[i] {
            continue;
        }
        placed[i] = true;
        order.push(&specs[i]);

        for &dependent in &dependents[i] {
            remaining[dependent].remove(&i);
            if remaining[dependent].is_empty() && !placed[dependent] {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != specs.len() {
        return Err(CycleError {
            participants: cycle_participants(specs, &placed, &remaining),
        });
    }

    Ok(order)
}

/// Flatten the wiring actions of a planned sequence, preserving plan order.
pub fn wiring_sequence<'a>(planned: &[&'a ArtifactSpec]) -> Vec<&'a WiringAction> {
    planned.iter().flat_map(|spec| spec.wiring.iter()).collect()
}

/// Narrow the unplaced set down to artifacts actually sitting on a cycle,
/// dropping artifacts that are merely downstream of one.
fn cycle_participants(
    specs: &[ArtifactSpec],
    placed: &[bool],
    remaining: &[BTreeSet<usize>],
) -> Vec<String> {
    let mut on_cycle: BTreeSet<usize> = (0..specs.len()).filter(|&i| !placed[i]).collect();

    loop {
        let depended_upon: BTreeSet<usize> = on_cycle
            .iter()
            .flat_map(|&i| remaining[i].iter().copied())
            .filter(|dep| on_cycle.contains(dep))
            .collect();
        let trimmed: BTreeSet<usize> = on_cycle
            .iter()
            .copied()
            .filter(|i| depended_upon.contains(i))
            .collect();
        if trimmed.len() == on_cycle.len() {
            break;
        }
        on_cycle = trimmed;
    }

    on_cycle
        .into_iter()
        .map(|i| specs[i].name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArgResolver;

    fn spec(name: &str, deps: &[&str]) -> ArtifactSpec {
        ArtifactSpec {
            name: name.to_string(),
            constructor_args: deps
                .iter()
                .map(|dep| ArgResolver::ArtifactAddress(dep.to_string()))
                .collect(),
            wiring: vec![],
        }
    }

    fn names(planned: &[&ArtifactSpec]) -> Vec<String> {
        planned.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_plan_respects_dependencies() {
        let specs = vec![
            spec("Factory", &[]),
            spec("Asset", &["Factory"]),
            spec("Verifier", &[]),
        ];

        let planned = plan(&specs).unwrap();
        let order = names(&planned);

        assert_eq!(order.len(), 3);
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("Factory") < pos("Asset"));
        // The independent frontier deploys before dependents.
        assert_eq!(order, vec!["Factory", "Verifier", "Asset"]);
    }

    #[test]
    fn test_plan_is_stable_across_calls() {
        let specs = vec![
            spec("A", &[]),
            spec("B", &[]),
            spec("C", &["A", "B"]),
            spec("D", &["C"]),
        ];

        let first = names(&plan(&specs).unwrap());
        let second = names(&plan(&specs).unwrap());
        assert_eq!(first, second);
        assert_eq!(first, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_plan_returns_every_spec_once() {
        let specs = vec![
            spec("A", &[]),
            spec("B", &["A"]),
            spec("C", &["A"]),
            spec("D", &["B", "C"]),
        ];

        let mut order = names(&plan(&specs).unwrap());
        order.sort();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_plan_rejects_cycle() {
        let specs = vec![spec("A", &["B"]), spec("B", &["A"]), spec("C", &[])];

        let err = plan(&specs).unwrap_err();
        assert_eq!(err.participants, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_cycle_excludes_downstream_artifacts() {
        // D depends on the A-B-C cycle without being part of it.
        let specs = vec![
            spec("A", &["C"]),
            spec("B", &["A"]),
            spec("C", &["B"]),
            spec("D", &["A"]),
        ];

        let err = plan(&specs).unwrap_err();
        assert_eq!(
            err.participants,
            vec!["A".to_string(), "B".to_string(), "C".to_string()]
        );
    }

    #[test]
    fn test_plan_tokon_registry() {
        let specs = crate::artifact::tokon_artifacts();
        let order = names(&plan(&specs).unwrap());
        assert_eq!(order, vec!["EventFactory", "BoundaryNFT", "ClaimVerification"]);
    }

    #[test]
    fn test_wiring_sequence_follows_plan_order() {
        let specs = crate::artifact::tokon_artifacts();
        let planned = plan(&specs).unwrap();
        let actions: Vec<&str> = wiring_sequence(&planned)
            .iter()
            .map(|a| a.name.as_str())
            .collect();

        assert_eq!(
            actions,
            vec![
                "set-boundary-nft",
                "grant-organizer-role",
                "set-claim-verification",
                "set-trusted-signer"
            ]
        );
    }
}

use super::assignment::{Found, Search, SearchReport, Shared, Tally, UNMET_LIMIT};
use super::problem::Problem;
use super::types::{CancelFlag, RosterError, SolverConfig};
use crate::model::ShiftCode;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use tracing::debug;

/// Résout séquentiellement, ou répartit les valeurs de la première variable entre
/// `config.workers` threads. Le budget de nœuds est commun à toutes les branches. Le
/// résultat retenu est celui de la première valeur (dans l'ordre d'essai) qui aboutit ;
/// dès qu'une branche aboutit, les branches suivantes s'arrêtent ou ne démarrent pas.
pub(crate) fn solve(
    problem: &Problem,
    config: &SolverConfig,
    cancel: &CancelFlag,
) -> Result<SearchReport, RosterError> {
    let mut base = Search::new(problem, *config, cancel.clone());
    if config.workers <= 1 || base.root().is_err() {
        return Ok(Search::new(problem, *config, cancel.clone()).solve());
    }
    let Some((cell, values)) = base.root_choice() else {
        return Ok(base.solve());
    };
    let workers = config.workers.min(values.len()).max(1);
    debug!(workers, branches = values.len(), "splitting root branches");

    let nodes = AtomicU64::new(0);
    let first_feasible = AtomicUsize::new(usize::MAX);
    let joined: Vec<thread::Result<Vec<(usize, SearchReport)>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let mine: Vec<(usize, ShiftCode)> = values
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(k, _)| k % workers == w)
                    .collect();
                let cancel = cancel.clone();
                let config = *config;
                let (nodes, first_feasible) = (&nodes, &first_feasible);
                scope.spawn(move || {
                    let mut out = Vec::new();
                    for (k, code) in mine {
                        if k > first_feasible.load(Ordering::Acquire) {
                            break;
                        }
                        let shared = Shared {
                            nodes,
                            first_feasible,
                            branch: k,
                        };
                        let report = Search::new(problem, config, cancel.clone())
                            .share(shared)
                            .pin(cell, code)
                            .solve();
                        if matches!(report.found, Found::Feasible(_)) {
                            first_feasible.fetch_min(k, Ordering::AcqRel);
                        }
                        out.push((k, report));
                    }
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut results = Vec::new();
    for worker in joined {
        results.extend(worker_results(worker)?);
    }
    results.sort_by_key(|(k, _)| *k);
    Ok(merge(results.into_iter().map(|(_, r)| r).collect()))
}

fn worker_results<T>(joined: thread::Result<T>) -> Result<T, RosterError> {
    joined.map_err(|panic| {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        RosterError::InternalInconsistency(format!("search worker panicked: {msg}"))
    })
}

/// Fusionne les branches dans l'ordre d'essai : la première qui aboutit l'emporte ;
/// sinon les échecs de toutes les branches sont cumulés comme en séquentiel.
fn merge(reports: Vec<SearchReport>) -> SearchReport {
    let nodes = reports.iter().map(|r| r.nodes).sum();
    let backtracks = reports.iter().map(|r| r.backtracks).sum();
    let mut timed_out = false;
    let mut tally = Tally::default();
    for report in reports {
        match report.found {
            Found::Feasible(grid) => {
                return SearchReport {
                    found: Found::Feasible(grid),
                    nodes,
                    backtracks,
                    tally: report.tally,
                };
            }
            Found::Timeout => timed_out = true,
            Found::Infeasible(_) => {}
        }
        tally.absorb(report.tally);
    }
    let found = if timed_out {
        Found::Timeout
    } else {
        Found::Infeasible(tally.most_frequent(UNMET_LIMIT))
    };
    SearchReport {
        found,
        nodes,
        backtracks,
        tally,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MajorShift, Nurse, PlanningMonth, RequestMap, ShiftKind, StaffingRequirement, Unit};

    fn problem(day: u32, evening: u32, night: u32, fixed_c: u32) -> Problem {
        let month = PlanningMonth::new(2026, 2).unwrap();
        let nurses: Vec<Nurse> = (1..=5)
            .map(|i| Nurse::new(format!("n{i}"), Unit::E9, MajorShift::Day))
            .collect();
        let mut staffing = StaffingRequirement::empty(month.days());
        staffing.set_all(Unit::E9, ShiftKind::Day, day);
        staffing.set_all(Unit::E9, ShiftKind::Evening, evening);
        staffing.set_all(Unit::E9, ShiftKind::Night, night);
        staffing.set_all(Unit::E9, ShiftKind::FixedC, fixed_c);
        Problem::new(month, &nurses, &RequestMap::new(), staffing).unwrap()
    }

    #[test]
    fn split_search_matches_sequential() {
        let p = problem(1, 1, 0, 0);
        let seq = solve(&p, &SolverConfig::default(), &CancelFlag::new()).unwrap();
        let config = SolverConfig {
            workers: 3,
            ..SolverConfig::default()
        };
        let par = solve(&p, &config, &CancelFlag::new()).unwrap();
        match (seq.found, par.found) {
            (Found::Feasible(a), Found::Feasible(b)) => assert_eq!(a, b),
            other => panic!("expected two feasible grids, got {other:?}"),
        }
    }

    #[test]
    fn node_budget_bounds_every_branch_together() {
        // le titulaire du C ne peut jamais prendre son repos : instance infaisable
        let p = problem(1, 1, 1, 1);
        let config = SolverConfig {
            node_budget: 5_000,
            ..SolverConfig::default()
        };
        let seq = solve(&p, &config, &CancelFlag::new()).unwrap();
        let par = solve(
            &p,
            &SolverConfig {
                workers: 4,
                ..config
            },
            &CancelFlag::new(),
        )
        .unwrap();
        assert!(seq.nodes <= 5_000);
        assert!(par.nodes <= 5_000, "parallel search visited {} nodes", par.nodes);
        match (seq.found, par.found) {
            (Found::Timeout, Found::Timeout) => assert_eq!(seq.nodes, par.nodes),
            (Found::Infeasible(a), Found::Infeasible(b)) => assert_eq!(a, b),
            other => panic!("sequential and split searches disagree: {other:?}"),
        }
    }

    #[test]
    fn worker_panic_is_an_internal_error() {
        let joined: thread::Result<()> = Err(Box::new("boom"));
        let err = worker_results(joined).unwrap_err();
        assert!(matches!(err, RosterError::InternalInconsistency(_)));
        assert!(err.to_string().contains("search worker panicked: boom"));
    }
}

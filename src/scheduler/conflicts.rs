//! Évaluation des contraintes dures et de l'objectif souple sur une grille
//! complète ou partielle. Les fonctions publiques prennent des jours 1-indexés.

use super::problem::Problem;
use super::types::{Conflict, ConflictKind, Grid, ObjectiveWeights, MAX_CONSECUTIVE_WORKDAYS};
use crate::model::{rest_forbidden, ShiftCode, ShiftKind, Unit};

/// Écarts d'effectif du jour. Sur un jour incomplet, seuls les excédents sont certains.
pub fn violates_staffing(problem: &Problem, grid: &Grid, day: u32) -> Vec<Conflict> {
    match day.checked_sub(1) {
        Some(d) if (d as usize) < problem.days() => staffing_at(problem, grid, d as usize),
        _ => Vec::new(),
    }
}

/// Vrai si `(veille, jour)` est une transition interdite. Le jour 1 n'a pas de veille.
pub fn violates_rest(_problem: &Problem, grid: &Grid, nurse: usize, day: u32) -> bool {
    day >= 2 && rest_broken_at(grid, nurse, day as usize - 1)
}

/// Vrai si les jours `day-6 ..= day` sont tous travaillés.
pub fn violates_consecutive(_problem: &Problem, grid: &Grid, nurse: usize, day: u32) -> bool {
    day >= 1 && run_broken_at(grid, nurse, day as usize - 1)
}

/// Vrai si une demande existe pour ce jour et que l'affectation en diffère.
pub fn violates_request(problem: &Problem, grid: &Grid, nurse: usize, day: u32) -> bool {
    day >= 1 && request_broken_at(problem, grid, nurse, day as usize - 1)
}

/// Règles C/F du jour : éligibilité des titulaires et substitution par `F`.
pub fn violates_fixed_coverage(problem: &Problem, grid: &Grid, day: u32) -> Vec<Conflict> {
    match day.checked_sub(1) {
        Some(d) if (d as usize) < problem.days() => fixed_coverage_at(problem, grid, d as usize),
        _ => Vec::new(),
    }
}

/// Balayage complet de toutes les contraintes dures.
pub fn detect_conflicts(problem: &Problem, grid: &Grid) -> Vec<Conflict> {
    let mut out = Vec::new();
    for d in 0..problem.days() {
        out.extend(staffing_at(problem, grid, d));
        out.extend(fixed_coverage_at(problem, grid, d));
        for (n, nurse) in problem.nurses().iter().enumerate() {
            let day = d as u32 + 1;
            if request_broken_at(problem, grid, n, d) {
                out.push(Conflict::for_nurse(&nurse.id, day, ConflictKind::RequestIgnored));
            }
            if d > 0 && rest_broken_at(grid, n, d) {
                out.push(Conflict::for_nurse(&nurse.id, day, ConflictKind::RestViolation));
            }
            if run_broken_at(grid, n, d) {
                out.push(Conflict::for_nurse(&nurse.id, day, ConflictKind::ConsecutiveDays));
            }
        }
    }
    out
}

pub(super) fn staffing_at(problem: &Problem, grid: &Grid, d: usize) -> Vec<Conflict> {
    let mut counts = [[0u32; 4]; 2];
    let mut complete = true;
    for (n, nurse) in problem.nurses().iter().enumerate() {
        match grid.get(n, d) {
            Some(code) => {
                if let Some((unit, kind)) = code.counts_toward(nurse.unit) {
                    counts[unit.index()][kind.index()] += 1;
                }
            }
            None => complete = false,
        }
    }

    let mut out = Vec::new();
    for unit in Unit::ALL {
        for kind in ShiftKind::ALL {
            let required = problem.required(unit, d, kind);
            let found = counts[unit.index()][kind.index()];
            if found > required || (complete && found < required) {
                out.push(Conflict::coverage(unit, kind, d as u32 + 1, required, found));
            }
        }
    }
    out
}

pub(super) fn rest_broken_at(grid: &Grid, nurse: usize, d: usize) -> bool {
    if d == 0 {
        return false;
    }
    match (grid.get(nurse, d - 1), grid.get(nurse, d)) {
        (Some(prev), Some(next)) => rest_forbidden(prev, next),
        _ => false,
    }
}

/// Série de 7 jours travaillés se terminant au jour `d`.
pub(super) fn run_broken_at(grid: &Grid, nurse: usize, d: usize) -> bool {
    if d < MAX_CONSECUTIVE_WORKDAYS {
        return false;
    }
    (d - MAX_CONSECUTIVE_WORKDAYS..=d)
        .all(|i| matches!(grid.get(nurse, i), Some(code) if code.is_working()))
}

pub(super) fn request_broken_at(problem: &Problem, grid: &Grid, nurse: usize, d: usize) -> bool {
    match (problem.request(nurse, d), grid.get(nurse, d)) {
        (Some(wanted), Some(got)) => wanted != got,
        _ => false,
    }
}

pub(super) fn fixed_coverage_at(problem: &Problem, grid: &Grid, d: usize) -> Vec<Conflict> {
    let day = d as u32 + 1;
    let mut out = Vec::new();
    let mut f_used = false;
    for (n, nurse) in problem.nurses().iter().enumerate() {
        let Some(code) = grid.get(n, d) else { continue };
        if code == ShiftCode::F {
            f_used = true;
        }
        if problem.request(n, d).is_none() && !problem.eligible(n, code) {
            out.push(Conflict::for_nurse(&nurse.id, day, ConflictKind::FixedCoverage));
        }
    }
    if f_used {
        // F n'est permis que si aucun titulaire libre ne travaille ce jour-là
        for (n, nurse) in problem.nurses().iter().enumerate() {
            let free_holder = problem.is_holder(n) && problem.request(n, d).is_none();
            if free_holder && matches!(grid.get(n, d), Some(code) if code.is_working()) {
                out.push(Conflict::for_nurse(&nurse.id, day, ConflictKind::FixedCoverage));
            }
        }
    }
    out
}

/// Composantes de l'objectif souple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreParts {
    /// Jours travaillés hors du poste majoritaire, toutes infirmières confondues.
    pub preference: u32,
    /// Variance (population) du nombre de repos par infirmière.
    pub off_variance: f64,
    /// Nombre de postes `F`.
    pub fixed_f: u32,
    /// Postes de renfort dans l'autre unité.
    pub support: u32,
}

impl ScoreParts {
    pub fn total(&self, w: &ObjectiveWeights) -> f64 {
        w.preference * f64::from(self.preference)
            + w.fairness * self.off_variance
            + w.fixed_f * f64::from(self.fixed_f)
            + w.support * f64::from(self.support)
    }
}

pub fn score_parts(problem: &Problem, grid: &Grid) -> ScoreParts {
    let offs: Vec<u32> = (0..problem.nurse_count()).map(|n| off_count(grid, n)).collect();
    ScoreParts {
        preference: (0..problem.nurse_count())
            .map(|n| preference_misses(problem, grid, n))
            .sum(),
        off_variance: variance(&offs),
        fixed_f: (0..problem.nurse_count()).map(|n| fixed_f_count(grid, n)).sum(),
        support: (0..problem.nurse_count()).map(|n| support_count(grid, n)).sum(),
    }
}

/// Score souple, plus bas = meilleur.
pub fn soft_score(problem: &Problem, grid: &Grid, weights: &ObjectiveWeights) -> f64 {
    score_parts(problem, grid).total(weights)
}

pub(super) fn preference_misses(problem: &Problem, grid: &Grid, nurse: usize) -> u32 {
    let wanted = problem.nurses()[nurse].major_shift.kind();
    grid.row(nurse)
        .iter()
        .filter_map(|c| c.and_then(ShiftCode::kind))
        .filter(|k| *k != wanted)
        .count() as u32
}

pub(super) fn off_count(grid: &Grid, nurse: usize) -> u32 {
    grid.row(nurse)
        .iter()
        .filter(|c| **c == Some(ShiftCode::Off))
        .count() as u32
}

pub(super) fn fixed_f_count(grid: &Grid, nurse: usize) -> u32 {
    grid.row(nurse)
        .iter()
        .filter(|c| **c == Some(ShiftCode::F))
        .count() as u32
}

pub(super) fn support_count(grid: &Grid, nurse: usize) -> u32 {
    grid.row(nurse)
        .iter()
        .filter(|c| matches!(c, Some(ShiftCode::A1 | ShiftCode::E1 | ShiftCode::N1)))
        .count() as u32
}

pub(super) fn variance(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| f64::from(*v)).sum::<f64>() / n;
    values
        .iter()
        .map(|v| (f64::from(*v) - mean).powi(2))
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MajorShift, Nurse, PlanningMonth, RequestMap, StaffingRequirement};

    fn problem(requests: &RequestMap) -> Problem {
        let month = PlanningMonth::new(2026, 2).unwrap();
        let nurses = vec![
            Nurse::new("a", Unit::E9, MajorShift::Day),
            Nurse::new("b", Unit::E10, MajorShift::Night),
        ];
        let mut staffing = StaffingRequirement::empty(month.days());
        staffing.set_all(Unit::E9, ShiftKind::Day, 1);
        Problem::new(month, &nurses, requests, staffing).unwrap()
    }

    #[test]
    fn staffing_counts_support_for_the_other_unit() {
        let p = problem(&RequestMap::new());
        let mut g = Grid::new(2, p.days());
        g.set(0, 0, Some(ShiftCode::Off));
        g.set(1, 0, Some(ShiftCode::A1));
        assert!(violates_staffing(&p, &g, 1).is_empty());

        g.set(0, 0, Some(ShiftCode::A));
        let v = violates_staffing(&p, &g, 1);
        assert_eq!(v.len(), 1);
        assert!(v[0].to_string().contains("exceeded on day 1"));

        g.set(0, 0, Some(ShiftCode::Off));
        g.set(1, 0, Some(ShiftCode::A));
        let v = violates_staffing(&p, &g, 1);
        // 10E Day en excédent, 9E Day en déficit
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn partial_day_reports_only_surplus() {
        let p = problem(&RequestMap::new());
        let mut g = Grid::new(2, p.days());
        g.set(0, 3, Some(ShiftCode::Off));
        assert!(violates_staffing(&p, &g, 4).is_empty());
    }

    #[test]
    fn rest_and_consecutive() {
        let p = problem(&RequestMap::new());
        let mut g = Grid::new(2, p.days());
        g.set(0, 0, Some(ShiftCode::E));
        g.set(0, 1, Some(ShiftCode::A));
        assert!(!violates_rest(&p, &g, 0, 1));
        assert!(violates_rest(&p, &g, 0, 2));

        for d in 0..7 {
            g.set(1, d, Some(ShiftCode::E));
        }
        assert!(!violates_consecutive(&p, &g, 1, 6));
        assert!(violates_consecutive(&p, &g, 1, 7));
        g.set(1, 3, Some(ShiftCode::Off));
        assert!(!violates_consecutive(&p, &g, 1, 7));
    }

    #[test]
    fn request_must_match() {
        let mut req = RequestMap::new();
        req.insert(&crate::model::NurseId::new("a"), 5, ShiftCode::Off);
        let p = problem(&req);
        let mut g = Grid::new(2, p.days());
        assert!(!violates_request(&p, &g, 0, 5));
        g.set(0, 4, Some(ShiftCode::A));
        assert!(violates_request(&p, &g, 0, 5));
        g.set(0, 4, Some(ShiftCode::Off));
        assert!(!violates_request(&p, &g, 0, 5));
    }

    #[test]
    fn f_forbidden_while_holder_works() {
        let p = problem(&RequestMap::new());
        assert!(p.is_holder(0));
        let mut g = Grid::new(2, p.days());
        g.set(0, 0, Some(ShiftCode::A));
        g.set(1, 0, Some(ShiftCode::F));
        assert_eq!(violates_fixed_coverage(&p, &g, 1).len(), 1);
        g.set(0, 0, Some(ShiftCode::Off));
        assert!(violates_fixed_coverage(&p, &g, 1).is_empty());
        g.set(1, 0, Some(ShiftCode::C));
        assert_eq!(violates_fixed_coverage(&p, &g, 1).len(), 1);
    }

    #[test]
    fn score_prefers_major_shift_and_even_offs() {
        let p = problem(&RequestMap::new());
        let w = ObjectiveWeights::default();
        let mut g = Grid::new(2, p.days());
        g.set(0, 0, Some(ShiftCode::A));
        g.set(1, 0, Some(ShiftCode::Off));
        let base = soft_score(&p, &g, &w);
        g.set(0, 0, Some(ShiftCode::E));
        assert!(soft_score(&p, &g, &w) > base);
        g.set(0, 0, Some(ShiftCode::A));
        g.set(1, 0, Some(ShiftCode::N1));
        let parts = score_parts(&p, &g);
        assert_eq!((parts.preference, parts.support), (0, 1));

        assert_eq!(variance(&[2, 2, 2]), 0.0);
        assert!((variance(&[1, 3]) - 1.0).abs() < 1e-9);
    }
}

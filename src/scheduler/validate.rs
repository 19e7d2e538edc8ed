use super::conflicts::detect_conflicts;
use super::problem::Problem;
use super::types::{Conflict, Grid, RosterError};
use tracing::error;

/// Contrôle de forme : dimensions et absence de case vide.
pub(crate) fn check_shape(problem: &Problem, grid: &Grid) -> Result<(), RosterError> {
    if grid.nurses() != problem.nurse_count() || grid.days() != problem.days() {
        return Err(RosterError::InternalInconsistency(format!(
            "grid is {}x{}, expected {}x{}",
            grid.nurses(),
            grid.days(),
            problem.nurse_count(),
            problem.days()
        )));
    }
    if let Some(pos) = (0..grid.nurses())
        .flat_map(|n| (0..grid.days()).map(move |d| (n, d)))
        .find(|&(n, d)| grid.get(n, d).is_none())
    {
        return Err(RosterError::InternalInconsistency(format!(
            "cell for {} on day {} is unassigned",
            problem.nurses()[pos.0].id,
            pos.1 + 1
        )));
    }
    Ok(())
}

/// Toutes les contraintes dures d'une grille complète.
pub fn check(problem: &Problem, grid: &Grid) -> Result<Vec<Conflict>, RosterError> {
    check_shape(problem, grid)?;
    Ok(detect_conflicts(problem, grid))
}

/// Dernière vérification avant de rendre un roster : toute violation est une erreur interne.
pub(crate) fn ensure(problem: &Problem, grid: &Grid) -> Result<(), RosterError> {
    let conflicts = check(problem, grid).inspect_err(|e| error!(error = %e, "roster shape check failed"))?;
    if let Some(first) = conflicts.first() {
        error!(count = conflicts.len(), first = %first, "solver produced an illegal roster");
        return Err(RosterError::InternalInconsistency(format!(
            "{} hard constraint violation(s), first: {first}",
            conflicts.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MajorShift, Nurse, PlanningMonth, RequestMap, ShiftCode, ShiftKind, StaffingRequirement, Unit};

    fn problem() -> Problem {
        let month = PlanningMonth::new(2026, 2).unwrap();
        let nurses = vec![Nurse::new("a", Unit::E9, MajorShift::Day)];
        let mut staffing = StaffingRequirement::empty(month.days());
        staffing.set(Unit::E9, 2, ShiftKind::Day, 1);
        Problem::new(month, &nurses, &RequestMap::new(), staffing).unwrap()
    }

    fn all_off(p: &Problem) -> Grid {
        let mut g = Grid::new(p.nurse_count(), p.days());
        for d in 0..p.days() {
            g.set(0, d, Some(ShiftCode::Off));
        }
        g
    }

    #[test]
    fn wrong_shape_is_internal_error() {
        let p = problem();
        let err = check(&p, &Grid::new(2, 28)).unwrap_err();
        assert!(matches!(err, RosterError::InternalInconsistency(_)));
        let mut g = all_off(&p);
        g.set(0, 5, None);
        let err = check(&p, &g).unwrap_err();
        assert!(err.to_string().contains("day 6 is unassigned"));
    }

    #[test]
    fn ensure_reports_violations() {
        let p = problem();
        let mut g = all_off(&p);
        let err = ensure(&p, &g).unwrap_err();
        assert!(err.to_string().contains("9E Day coverage unmet on day 2"));
        g.set(0, 1, Some(ShiftCode::A));
        assert!(ensure(&p, &g).is_ok());
    }
}

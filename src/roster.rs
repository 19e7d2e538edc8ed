//! Format externe du planning et résumés d'effectifs.

use crate::model::{Nurse, NurseId, PlanningMonth, ShiftCode, ShiftKind, Unit};
use crate::scheduler::{Grid, Problem, RosterError};
use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySchedule {
    pub date: NaiveDate,
    pub shift: ShiftCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NurseSchedule {
    pub nurse_id: NurseId,
    pub schedule: Vec<DailySchedule>,
}

/// Planning complet d'un mois : un code par infirmière et par jour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    year: i32,
    month: u32,
    schedules: Vec<NurseSchedule>,
}

impl Roster {
    /// Construit le roster d'une grille complète, dans l'ordre des infirmières du problème.
    pub fn from_grid(problem: &Problem, grid: &Grid) -> Result<Self, RosterError> {
        let month = problem.month();
        let mut schedules = Vec::with_capacity(problem.nurse_count());
        for (n, nurse) in problem.nurses().iter().enumerate() {
            let mut schedule = Vec::with_capacity(problem.days());
            for d in 0..problem.days() {
                let day = d as u32 + 1;
                let shift = grid.get(n, d).ok_or_else(|| {
                    RosterError::InternalInconsistency(format!(
                        "cell for {} on day {day} is unassigned",
                        nurse.id
                    ))
                })?;
                let date = month.date(day).ok_or_else(|| {
                    RosterError::InternalInconsistency(format!("day {day} outside month"))
                })?;
                schedule.push(DailySchedule { date, shift });
            }
            schedules.push(NurseSchedule {
                nurse_id: nurse.id.clone(),
                schedule,
            });
        }
        Ok(Self {
            year: month.year(),
            month: month.month(),
            schedules,
        })
    }

    /// Relit le roster dans la grille du problème ; un roster incomplet ou étranger
    /// au problème est une entrée invalide.
    pub fn to_grid(&self, problem: &Problem) -> Result<Grid, RosterError> {
        let month = problem.month();
        if (self.year, self.month) != (month.year(), month.month()) {
            return Err(RosterError::InvalidInput(format!(
                "roster is for {}-{:02}, expected {}-{:02}",
                self.year,
                self.month,
                month.year(),
                month.month()
            )));
        }
        let mut grid = Grid::new(problem.nurse_count(), problem.days());
        for entry in &self.schedules {
            let n = problem.index_of(&entry.nurse_id).ok_or_else(|| {
                RosterError::InvalidInput(format!("roster names unknown nurse {}", entry.nurse_id))
            })?;
            for cell in &entry.schedule {
                if !month.contains(cell.date) {
                    return Err(RosterError::InvalidInput(format!(
                        "date {} outside {}-{:02}",
                        cell.date, self.year, self.month
                    )));
                }
                let d = cell.date.day0() as usize;
                if grid.get(n, d).is_some() {
                    return Err(RosterError::InvalidInput(format!(
                        "{} has two shifts on {}",
                        entry.nurse_id, cell.date
                    )));
                }
                grid.set(n, d, Some(cell.shift));
            }
        }
        if !grid.is_complete() {
            return Err(RosterError::InvalidInput(
                "roster does not assign every nurse on every day".into(),
            ));
        }
        Ok(grid)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn planning_month(&self) -> Result<PlanningMonth, RosterError> {
        PlanningMonth::new(self.year, self.month)
    }

    pub fn schedules(&self) -> &[NurseSchedule] {
        &self.schedules
    }

    /// Code d'une infirmière pour un jour du mois (1-indexé).
    pub fn shift(&self, nurse: &NurseId, day: u32) -> Option<ShiftCode> {
        self.schedules
            .iter()
            .find(|s| &s.nurse_id == nurse)?
            .schedule
            .iter()
            .find(|c| c.date.day() == day)
            .map(|c| c.shift)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serializing roster")
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("parsing roster JSON")
    }

    /// Effectifs quotidiens et totaux de repos. Les infirmières absentes de `nurses`
    /// comptent dans les totaux par famille mais pas dans la couverture par unité.
    pub fn summary(&self, nurses: &[Nurse]) -> RosterSummary {
        let units: HashMap<&NurseId, Unit> = nurses.iter().map(|n| (&n.id, n.unit)).collect();
        let days = self
            .schedules
            .iter()
            .map(|s| s.schedule.len())
            .max()
            .unwrap_or(0);
        let mut daily: Vec<DayCount> = (0..days)
            .map(|d| DayCount {
                day: d as u32 + 1,
                ..DayCount::default()
            })
            .collect();
        let mut off_totals = Vec::with_capacity(self.schedules.len());

        for entry in &self.schedules {
            let unit = units.get(&entry.nurse_id).copied();
            let mut offs = 0;
            for cell in &entry.schedule {
                let Some(count) = daily.get_mut(cell.date.day0() as usize) else {
                    continue;
                };
                match cell.shift.kind() {
                    None => {
                        count.off += 1;
                        offs += 1;
                    }
                    Some(ShiftKind::Day) => count.day_shift += 1,
                    Some(ShiftKind::Evening) => count.evening_shift += 1,
                    Some(ShiftKind::Night) => count.night_shift += 1,
                    Some(ShiftKind::FixedC) => count.fixed_shift += 1,
                }
                if let Some((u, k)) = unit.and_then(|u| cell.shift.counts_toward(u)) {
                    count.coverage[u.index()][k.index()] += 1;
                }
            }
            off_totals.push((entry.nurse_id.clone(), offs));
        }

        RosterSummary {
            year: self.year,
            month: self.month,
            daily,
            off_totals,
        }
    }
}

/// Effectifs d'un jour : `A+A1`, `E+E1`, `N+N1`, `C+F`, repos, et couverture par unité.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub day: u32,
    pub day_shift: u32,
    pub evening_shift: u32,
    pub night_shift: u32,
    pub fixed_shift: u32,
    pub off: u32,
    /// `[unité][famille]`, renforts comptés dans l'unité servie.
    pub coverage: [[u32; 4]; 2],
}

impl DayCount {
    pub fn covered(&self, unit: Unit, kind: ShiftKind) -> u32 {
        self.coverage[unit.index()][kind.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    pub year: i32,
    pub month: u32,
    pub daily: Vec<DayCount>,
    pub off_totals: Vec<(NurseId, u32)>,
}

impl RosterSummary {
    /// Tableau texte : une ligne par jour puis les repos par infirmière.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}-{:02}", self.year, self.month);
        let _ = writeln!(
            out,
            "{:>3}  {:>4} {:>4} {:>4} {:>4} {:>4}  {:>8} {:>9}",
            "day", "A", "E", "N", "C/F", "OFF", "9E A/E/N", "10E A/E/N"
        );
        for c in &self.daily {
            let unit = |u: Unit| {
                format!(
                    "{}/{}/{}",
                    c.covered(u, ShiftKind::Day),
                    c.covered(u, ShiftKind::Evening),
                    c.covered(u, ShiftKind::Night)
                )
            };
            let _ = writeln!(
                out,
                "{:>3}  {:>4} {:>4} {:>4} {:>4} {:>4}  {:>8} {:>9}",
                c.day,
                c.day_shift,
                c.evening_shift,
                c.night_shift,
                c.fixed_shift,
                c.off,
                unit(Unit::E9),
                unit(Unit::E10)
            );
        }
        let _ = writeln!(out, "off totals:");
        for (id, offs) in &self.off_totals {
            let _ = writeln!(out, "  {id}: {offs}");
        }
        out
    }
}

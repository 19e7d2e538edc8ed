use crate::model::{PlanningMonth, ShiftKind, StaffingRequirement, Unit};
use crate::scheduler::{ObjectiveWeights, SolverConfig};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Modèle d'effectifs : besoins de base par unité, exceptions par jour de semaine ou par
/// date, et réglages optionnels du solveur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffingTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub units: BTreeMap<Unit, Headcount>,
    #[serde(default)]
    pub overrides: Vec<Override>,
    #[serde(default)]
    pub rules: Option<Rules>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl StaffingTemplate {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("template id cannot be empty");
        }
        if self.name.trim().is_empty() {
            bail!("template name cannot be empty");
        }
        if self.units.is_empty() {
            bail!("template must define at least one unit");
        }
        if let Some(h) = self.units.get(&Unit::E10) {
            if h.fixed_c > 0 {
                bail!("C/F coverage belongs to 9E, not 10E");
            }
        }
        if let Some(h) = self.units.get(&Unit::E9) {
            if h.fixed_c > 1 {
                bail!("C/F coverage is a single slot (got {})", h.fixed_c);
            }
        }
        for ov in &self.overrides {
            ov.validate()?;
        }
        if let Some(rules) = &self.rules {
            rules.validate()?;
        }
        Ok(())
    }

    /// Besoins jour par jour du mois ; la dernière exception applicable l'emporte.
    pub fn requirement_for(&self, month: PlanningMonth) -> StaffingRequirement {
        let mut req = StaffingRequirement::empty(month.days());
        for (unit, h) in &self.units {
            for kind in ShiftKind::ALL {
                req.set_all(*unit, kind, h.get(kind));
            }
        }
        for day in 1..=month.days() {
            let weekday = month
                .weekday(day)
                .map(|w| w.number_from_monday() as u8)
                .unwrap_or(0);
            for ov in self.overrides.iter().filter(|o| o.matches(day, weekday)) {
                req.set(ov.unit, day, ov.kind, ov.count);
            }
        }
        req
    }

    /// Configuration du solveur après application des `rules`.
    pub fn solver_config(&self, base: SolverConfig) -> SolverConfig {
        match &self.rules {
            Some(rules) => rules.apply(base),
            None => base,
        }
    }
}

impl Default for StaffingTemplate {
    /// Politique des deux unités : 9E A=3 E=2 N=2 C/F=1, 10E A=3 E=2 N=2.
    fn default() -> Self {
        let mut units = BTreeMap::new();
        units.insert(
            Unit::E9,
            Headcount {
                day: 3,
                evening: 2,
                night: 2,
                fixed_c: 1,
            },
        );
        units.insert(
            Unit::E10,
            Headcount {
                day: 3,
                evening: 2,
                night: 2,
                fixed_c: 0,
            },
        );
        Self {
            id: "default".into(),
            name: "9E/10E standard staffing".into(),
            description: None,
            units,
            overrides: Vec::new(),
            rules: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Headcount {
    pub day: u32,
    pub evening: u32,
    pub night: u32,
    #[serde(default)]
    pub fixed_c: u32,
}

impl Headcount {
    pub fn get(&self, kind: ShiftKind) -> u32 {
        match kind {
            ShiftKind::Day => self.day,
            ShiftKind::Evening => self.evening,
            ShiftKind::Night => self.night,
            ShiftKind::FixedC => self.fixed_c,
        }
    }
}

/// Exception au besoin de base : s'applique aux jours de semaine listés (1 = lundi)
/// et aux dates listées (jour du mois).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub unit: Unit,
    pub kind: ShiftKind,
    pub count: u32,
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default)]
    pub days: Vec<u32>,
}

impl Override {
    fn validate(&self) -> Result<()> {
        if self.weekdays.is_empty() && self.days.is_empty() {
            bail!("override must list weekdays or days");
        }
        if let Some(w) = self.weekdays.iter().find(|w| !(1..=7).contains(*w)) {
            bail!("override weekday {w} outside 1..=7");
        }
        if let Some(d) = self.days.iter().find(|d| !(1..=31).contains(*d)) {
            bail!("override day {d} outside 1..=31");
        }
        if self.kind == ShiftKind::FixedC
            && ((self.unit == Unit::E10 && self.count > 0) || self.count > 1)
        {
            bail!("override breaks the single 9E C/F slot");
        }
        Ok(())
    }

    fn matches(&self, day: u32, weekday: u8) -> bool {
        self.days.contains(&day) || self.weekdays.contains(&weekday)
    }
}

/// Réglages du solveur portés par le modèle ; les champs absents gardent la valeur courante.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    #[serde(default)]
    pub node_budget: Option<u64>,
    #[serde(default)]
    pub local_search_iterations: Option<usize>,
    #[serde(default)]
    pub tired_threshold: Option<usize>,
    #[serde(default)]
    pub weights: Option<ObjectiveWeights>,
}

impl Rules {
    fn validate(&self) -> Result<()> {
        if self.node_budget == Some(0) {
            bail!("node_budget must be > 0");
        }
        if let Some(w) = &self.weights {
            if [w.preference, w.fairness, w.fixed_f, w.support]
                .iter()
                .any(|x| !x.is_finite() || *x < 0.0)
            {
                bail!("objective weights must be finite and non-negative");
            }
        }
        Ok(())
    }

    pub fn apply(&self, mut config: SolverConfig) -> SolverConfig {
        if let Some(n) = self.node_budget {
            config.node_budget = n;
        }
        if let Some(n) = self.local_search_iterations {
            config.local_search_iterations = n;
        }
        if let Some(n) = self.tired_threshold {
            config.tired_threshold = n;
        }
        if let Some(w) = self.weights {
            config.weights = w;
        }
        config
    }
}

pub fn export_template_json<P: AsRef<Path>>(path: P, template: &StaffingTemplate) -> Result<()> {
    let json = serde_json::to_string_pretty(template)?;
    fs::write(&path, json)
        .with_context(|| format!("writing template {}", path.as_ref().display()))?;
    Ok(())
}

pub fn load_template_from_file<P: AsRef<Path>>(path: P) -> Result<StaffingTemplate> {
    let data = fs::read(&path)
        .with_context(|| format!("reading template {}", path.as_ref().display()))?;
    let template: StaffingTemplate = serde_json::from_slice(&data)
        .with_context(|| format!("parsing template {}", path.as_ref().display()))?;
    template.validate()?;
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_requirement() {
        let t = StaffingTemplate::default();
        t.validate().unwrap();
        let month = PlanningMonth::new(2026, 3).unwrap();
        let req = t.requirement_for(month);
        assert_eq!(req.days(), 31);
        assert_eq!(req.total(1), 15);
        assert_eq!(req.get(Unit::E9, 31, ShiftKind::FixedC), 1);
        assert_eq!(req.get(Unit::E10, 31, ShiftKind::FixedC), 0);
    }

    #[test]
    fn overrides_by_weekday_and_date() {
        let mut t = StaffingTemplate::default();
        t.overrides.push(Override {
            unit: Unit::E9,
            kind: ShiftKind::Day,
            count: 2,
            weekdays: vec![6, 7],
            days: vec![],
        });
        t.overrides.push(Override {
            unit: Unit::E10,
            kind: ShiftKind::Night,
            count: 3,
            weekdays: vec![],
            days: vec![15],
        });
        t.validate().unwrap();
        // 2026-03-01 est un dimanche
        let req = t.requirement_for(PlanningMonth::new(2026, 3).unwrap());
        assert_eq!(req.get(Unit::E9, 1, ShiftKind::Day), 2);
        assert_eq!(req.get(Unit::E9, 2, ShiftKind::Day), 3);
        assert_eq!(req.get(Unit::E10, 15, ShiftKind::Night), 3);
        assert_eq!(req.get(Unit::E10, 16, ShiftKind::Night), 2);
    }

    #[test]
    fn invalid_templates_are_rejected() {
        let mut t = StaffingTemplate::default();
        t.units.get_mut(&Unit::E10).unwrap().fixed_c = 1;
        assert!(t.validate().is_err());

        let mut t = StaffingTemplate::default();
        t.overrides.push(Override {
            unit: Unit::E9,
            kind: ShiftKind::Day,
            count: 1,
            weekdays: vec![8],
            days: vec![],
        });
        assert!(t.validate().is_err());
    }

    #[test]
    fn rules_override_solver_defaults() {
        let t: StaffingTemplate = serde_json::from_str(
            r#"{
                "id": "lean",
                "name": "Lean",
                "units": { "9E": { "day": 1, "evening": 1, "night": 0, "fixedC": 1 } },
                "rules": { "nodeBudget": 1000, "weights": { "preference": 2.0 } }
            }"#,
        )
        .unwrap();
        t.validate().unwrap();
        let c = t.solver_config(SolverConfig::default());
        assert_eq!(c.node_budget, 1000);
        assert_eq!(c.weights.preference, 2.0);
        assert_eq!(c.weights.fairness, 4.0);
        assert_eq!(c.tired_threshold, 5);
    }
}

use super::util::{contributors, Domain};
use super::RosterError;
use crate::model::{
    MajorShift, Nurse, NurseId, PlanningMonth, RequestMap, ShiftCode, ShiftKind,
    StaffingRequirement, Unit,
};
use std::collections::HashMap;

/// Instance validée : infirmières, demandes et besoins d'un mois, prêts pour la recherche.
///
/// Les jours sont 0-indexés dans toutes les méthodes de ce type.
#[derive(Debug, Clone)]
pub struct Problem {
    month: PlanningMonth,
    nurses: Vec<Nurse>,
    index: HashMap<NurseId, usize>,
    requests: Vec<Vec<Option<ShiftCode>>>,
    staffing: StaffingRequirement,
    holders: Vec<bool>,
    contrib: Vec<[[Domain; 4]; 2]>,
}

impl Problem {
    /// Valide les entrées ; toute anomalie est un `InvalidInput`.
    pub fn new(
        month: PlanningMonth,
        nurses: &[Nurse],
        requests: &RequestMap,
        staffing: StaffingRequirement,
    ) -> Result<Self, RosterError> {
        if nurses.is_empty() {
            return Err(RosterError::InvalidInput("nurse list is empty".into()));
        }
        if staffing.days() != month.days() {
            return Err(RosterError::InvalidInput(format!(
                "staffing covers {} days, month has {}",
                staffing.days(),
                month.days()
            )));
        }
        for day in 1..=month.days() {
            if staffing.get(Unit::E10, day, ShiftKind::FixedC) > 0 {
                return Err(RosterError::InvalidInput(format!(
                    "C/F coverage is pinned to 9E (10E requirement on day {day})"
                )));
            }
            if staffing.get(Unit::E9, day, ShiftKind::FixedC) > 1 {
                return Err(RosterError::InvalidInput(format!(
                    "C/F coverage is a single slot (requirement > 1 on day {day})"
                )));
            }
        }

        let mut index = HashMap::with_capacity(nurses.len());
        for (i, nurse) in nurses.iter().enumerate() {
            if nurse.id.as_str().trim().is_empty() {
                return Err(RosterError::InvalidInput("nurse id cannot be empty".into()));
            }
            if index.insert(nurse.id.clone(), i).is_some() {
                return Err(RosterError::InvalidInput(format!(
                    "duplicate nurse id: {}",
                    nurse.id
                )));
            }
        }

        let days = month.days() as usize;
        let mut grid = vec![vec![None; days]; nurses.len()];
        for (id, day, code) in requests.iter() {
            let &n = index.get(id).ok_or_else(|| {
                RosterError::InvalidInput(format!("request for unknown nurse: {id}"))
            })?;
            if day == 0 || day > month.days() {
                return Err(RosterError::InvalidInput(format!(
                    "request day {day} outside month of {} days (nurse {id})",
                    month.days()
                )));
            }
            grid[n][day as usize - 1] = Some(code);
        }

        let mut holders: Vec<bool> = nurses
            .iter()
            .enumerate()
            .map(|(n, nurse)| {
                nurse.major_shift == MajorShift::FixedC
                    || grid[n].iter().any(|c| *c == Some(ShiftCode::C))
            })
            .collect();
        if !holders.iter().any(|h| *h) {
            if let Some(first) = nurses.iter().position(|n| n.unit == Unit::E9) {
                holders[first] = true;
            }
        }

        let contrib = nurses
            .iter()
            .map(|nurse| {
                let mut masks = [[Domain::EMPTY; 4]; 2];
                for unit in Unit::ALL {
                    for kind in ShiftKind::ALL {
                        masks[unit.index()][kind.index()] = contributors(unit, kind, nurse.unit);
                    }
                }
                masks
            })
            .collect();

        Ok(Self {
            month,
            nurses: nurses.to_vec(),
            index,
            requests: grid,
            staffing,
            holders,
            contrib,
        })
    }

    pub fn month(&self) -> PlanningMonth {
        self.month
    }

    pub fn nurses(&self) -> &[Nurse] {
        &self.nurses
    }

    pub fn nurse_count(&self) -> usize {
        self.nurses.len()
    }

    pub fn days(&self) -> usize {
        self.month.days() as usize
    }

    pub fn index_of(&self, id: &NurseId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn request(&self, nurse: usize, day: usize) -> Option<ShiftCode> {
        self.requests.get(nurse).and_then(|r| r.get(day)).copied().flatten()
    }

    /// Titulaire du poste C.
    pub fn is_holder(&self, nurse: usize) -> bool {
        self.holders.get(nurse).copied().unwrap_or(false)
    }

    pub fn required(&self, unit: Unit, day: usize, kind: ShiftKind) -> u32 {
        self.staffing.get(unit, day as u32 + 1, kind)
    }

    pub fn staffing(&self) -> &StaffingRequirement {
        &self.staffing
    }

    pub(crate) fn contributors(&self, nurse: usize, unit: Unit, kind: ShiftKind) -> Domain {
        self.contrib[nurse][unit.index()][kind.index()]
    }

    /// Vrai si le code est permis hors demande pour cette infirmière (C réservé aux titulaires).
    pub fn eligible(&self, nurse: usize, code: ShiftCode) -> bool {
        match code {
            ShiftCode::C => self.is_holder(nurse),
            ShiftCode::F => !self.is_holder(nurse),
            _ => true,
        }
    }

    /// Domaine initial : la demande si elle existe, sinon les codes éligibles.
    pub(crate) fn initial_domain(&self, nurse: usize, day: usize) -> Domain {
        match self.request(nurse, day) {
            Some(code) => Domain::single(code),
            None => ShiftCode::ALL
                .into_iter()
                .filter(|c| self.eligible(nurse, *c))
                .fold(Domain::EMPTY, Domain::with),
        }
    }
}

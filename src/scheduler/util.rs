use crate::model::{rest_forbidden, ShiftCode, ShiftKind, Unit};

/// Domaine d'une variable (infirmière, jour) : ensemble de codes sous forme de bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Domain(u16);

impl Domain {
    pub const EMPTY: Domain = Domain(0);
    pub const FULL: Domain = Domain(0x1FF);
    pub const OFF: Domain = Domain(1 << 8);
    pub const WORKING: Domain = Domain(0xFF);

    pub fn single(code: ShiftCode) -> Domain {
        Domain(1 << code.index())
    }

    #[cfg(test)]
    pub fn of(codes: &[ShiftCode]) -> Domain {
        codes.iter().fold(Domain::EMPTY, |d, c| d.with(*c))
    }

    pub fn with(self, code: ShiftCode) -> Domain {
        Domain(self.0 | (1 << code.index()))
    }

    pub fn without(self, code: ShiftCode) -> Domain {
        Domain(self.0 & !(1 << code.index()))
    }

    pub fn contains(self, code: ShiftCode) -> bool {
        self.0 & (1 << code.index()) != 0
    }

    pub fn and(self, other: Domain) -> Domain {
        Domain(self.0 & other.0)
    }

    pub fn minus(self, other: Domain) -> Domain {
        Domain(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersects(self, other: Domain) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_subset(self, other: Domain) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Valeur unique si le domaine est réduit à un code.
    pub fn value(self) -> Option<ShiftCode> {
        if self.len() == 1 {
            ShiftCode::from_index(self.0.trailing_zeros() as usize)
        } else {
            None
        }
    }

    /// Sûrement travaillé : le repos n'est plus possible.
    pub fn surely_working(self) -> bool {
        !self.is_empty() && !self.contains(ShiftCode::Off)
    }

    pub fn iter(self) -> impl Iterator<Item = ShiftCode> {
        ShiftCode::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    fn bits(self) -> usize {
        usize::from(self.0)
    }
}

/// Supports de la règle de repos, précalculés pour les 512 domaines possibles.
#[derive(Debug, Clone)]
pub(crate) struct RestTable {
    after: Vec<Domain>,
    before: Vec<Domain>,
}

impl RestTable {
    pub fn new() -> Self {
        let all = (0..=Domain::FULL.0).map(Domain);
        Self {
            after: all.clone().map(allowed_after).collect(),
            before: all.map(allowed_before).collect(),
        }
    }

    pub fn after(&self, prev: Domain) -> Domain {
        self.after[prev.bits()]
    }

    pub fn before(&self, next: Domain) -> Domain {
        self.before[next.bits()]
    }
}

/// Codes qu'une infirmière de `nurse_unit` peut porter pour couvrir `(unit, kind)`.
pub(crate) fn contributors(unit: Unit, kind: ShiftKind, nurse_unit: Unit) -> Domain {
    ShiftCode::ALL
        .into_iter()
        .filter(|c| c.counts_toward(nurse_unit) == Some((unit, kind)))
        .fold(Domain::EMPTY, Domain::with)
}

/// Codes autorisés le lendemain d'au moins une valeur de `prev`.
pub(crate) fn allowed_after(prev: Domain) -> Domain {
    let mut out = Domain::EMPTY;
    for p in prev.iter() {
        for n in ShiftCode::ALL {
            if !rest_forbidden(p, n) {
                out = out.with(n);
            }
        }
    }
    out
}

/// Codes autorisés la veille d'au moins une valeur de `next`.
pub(crate) fn allowed_before(next: Domain) -> Domain {
    let mut out = Domain::EMPTY;
    for n in next.iter() {
        for p in ShiftCode::ALL {
            if !rest_forbidden(p, n) {
                out = out.with(p);
            }
        }
    }
    out
}

#![forbid(unsafe_code)]
use nurse_roster::model::rest_forbidden;
use nurse_roster::{
    generate, CancelFlag, Headcount, MajorShift, Nurse, NurseId, Outcome, RequestMap, Roster,
    RosterError, Scheduler, ShiftCode, SolverConfig, StaffingTemplate, Unit,
};

fn nine_e_template(day: u32, evening: u32, night: u32, fixed_c: u32) -> StaffingTemplate {
    let mut t = StaffingTemplate {
        id: "test".into(),
        name: "test staffing".into(),
        ..StaffingTemplate::default()
    };
    t.units.clear();
    t.units.insert(
        Unit::E9,
        Headcount {
            day,
            evening,
            night,
            fixed_c,
        },
    );
    t
}

fn nine_e_nurses(count: usize) -> Vec<Nurse> {
    (1..=count)
        .map(|i| Nurse::new(format!("n{i}"), Unit::E9, MajorShift::Day))
        .collect()
}

fn assert_labour_rules(roster: &Roster) {
    for entry in roster.schedules() {
        let codes: Vec<ShiftCode> = entry.schedule.iter().map(|c| c.shift).collect();
        for pair in codes.windows(2) {
            assert!(
                !rest_forbidden(pair[0], pair[1]),
                "{} has {} then {}",
                entry.nurse_id,
                pair[0],
                pair[1]
            );
        }
        for week in codes.windows(7) {
            assert!(
                week.contains(&ShiftCode::Off),
                "{} works 7 days in a row",
                entry.nurse_id
            );
        }
    }
}

#[test]
fn scenario_holder_covers_c_and_f_only_on_holder_off_days() {
    let nurses = nine_e_nurses(5);
    let scheduler = Scheduler::default().with_template(nine_e_template(1, 1, 0, 1));
    let g = scheduler
        .generate(2026, 2, &nurses, &RequestMap::new())
        .unwrap();
    assert_eq!(g.outcome, Outcome::Feasible);
    let roster = g.roster.expect("feasible roster");
    assert_eq!(roster.schedules().len(), 5);
    assert!(roster.schedules().iter().all(|s| s.schedule.len() == 28));
    assert_labour_rules(&roster);
    assert!(scheduler
        .check_roster(&roster, &nurses, &RequestMap::new())
        .unwrap()
        .is_empty());

    let holder = NurseId::new("n1");
    let summary = roster.summary(&nurses);
    for day in 1..=28 {
        let count = &summary.daily[day as usize - 1];
        assert_eq!(
            (count.day_shift, count.evening_shift, count.fixed_shift),
            (1, 1, 1),
            "day {day}"
        );
        let codes: Vec<(NurseId, ShiftCode)> = nurses
            .iter()
            .map(|n| (n.id.clone(), roster.shift(&n.id, day).unwrap()))
            .collect();
        for (id, code) in &codes {
            if *code == ShiftCode::C {
                assert_eq!(id, &holder, "C worked by a non-holder on day {day}");
            }
            if *code == ShiftCode::F {
                assert_eq!(roster.shift(&holder, day), Some(ShiftCode::Off), "day {day}");
            }
        }
    }
}

#[test]
fn scenario_everyone_off_reports_the_unmet_day() {
    let nurses = nine_e_nurses(3);
    let mut requests = RequestMap::new();
    for n in &nurses {
        requests.insert(&n.id, 5, ShiftCode::Off);
    }
    let g = Scheduler::default()
        .with_template(nine_e_template(1, 0, 0, 0))
        .generate(2026, 2, &nurses, &requests)
        .unwrap();
    assert!(g.roster.is_none());
    let Outcome::Infeasible { unmet } = g.outcome else {
        panic!("expected infeasible, got {:?}", g.outcome);
    };
    let text: Vec<String> = unmet.iter().map(ToString::to_string).collect();
    assert_eq!(text, ["9E Day coverage unmet on day 5 (required 1, found 0)"]);
}

#[test]
fn scenario_off_after_six_forced_days_is_accepted() {
    let nurses = nine_e_nurses(5);
    let n2 = NurseId::new("n2");
    let mut requests = RequestMap::new();
    for day in 4..=9 {
        requests.insert(&n2, day, ShiftCode::A);
    }
    requests.insert(&n2, 10, ShiftCode::Off);

    let scheduler = Scheduler::default().with_template(nine_e_template(1, 1, 0, 1));
    let g = scheduler.generate(2026, 2, &nurses, &requests).unwrap();
    assert_eq!(g.outcome, Outcome::Feasible);
    let roster = g.roster.unwrap();
    for day in 4..=9 {
        assert_eq!(roster.shift(&n2, day), Some(ShiftCode::A));
    }
    assert_eq!(roster.shift(&n2, 10), Some(ShiftCode::Off));
    // un septième jour consécutif est impossible : la veille est forcément un repos
    assert_eq!(roster.shift(&n2, 3), Some(ShiftCode::Off));
    assert_labour_rules(&roster);
    assert!(scheduler
        .check_roster(&roster, &nurses, &requests)
        .unwrap()
        .is_empty());
}

#[test]
fn generation_is_deterministic() {
    let nurses = nine_e_nurses(5);
    let scheduler = Scheduler::default().with_template(nine_e_template(1, 1, 0, 1));
    let a = scheduler.generate(2026, 2, &nurses, &RequestMap::new()).unwrap();
    let b = scheduler.generate(2026, 2, &nurses, &RequestMap::new()).unwrap();
    assert_eq!(a.roster, b.roster);
    assert_eq!(a.stats, b.stats);
}

#[test]
fn worker_split_returns_the_sequential_roster() {
    let nurses = nine_e_nurses(5);
    let template = nine_e_template(1, 1, 0, 1);
    let seq = Scheduler::default()
        .with_template(template.clone())
        .generate(2026, 2, &nurses, &RequestMap::new())
        .unwrap();
    let par = Scheduler::new(SolverConfig {
        workers: 4,
        ..SolverConfig::default()
    })
    .with_template(template)
    .generate(2026, 2, &nurses, &RequestMap::new())
    .unwrap();
    assert_eq!(seq.outcome, Outcome::Feasible);
    assert_eq!(seq.roster, par.roster);
}

#[test]
fn local_search_never_worsens_the_score() {
    let nurses = nine_e_nurses(5);
    let template = nine_e_template(1, 1, 0, 1);
    let g = Scheduler::default()
        .with_template(template.clone())
        .generate(2026, 2, &nurses, &RequestMap::new())
        .unwrap();
    assert!(g.stats.final_score <= g.stats.initial_score);

    let raw = Scheduler::new(SolverConfig {
        local_search_iterations: 0,
        ..SolverConfig::default()
    })
    .with_template(template)
    .generate(2026, 2, &nurses, &RequestMap::new())
    .unwrap();
    assert_eq!(raw.outcome, Outcome::Feasible);
    assert_eq!(raw.stats.improving_moves, 0);
    assert_eq!(raw.stats.initial_score, raw.stats.final_score);
}

#[test]
fn cancelled_generation_times_out() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let g = Scheduler::default()
        .with_template(nine_e_template(1, 1, 0, 1))
        .with_cancel(cancel)
        .generate(2026, 2, &nine_e_nurses(5), &RequestMap::new())
        .unwrap();
    assert!(matches!(g.outcome, Outcome::Timeout { .. }));
    assert!(g.roster.is_none());
}

#[test]
fn tiny_node_budget_times_out() {
    let g = Scheduler::new(SolverConfig {
        node_budget: 1,
        ..SolverConfig::default()
    })
    .with_template(nine_e_template(1, 1, 0, 1))
    .generate(2026, 2, &nine_e_nurses(5), &RequestMap::new())
    .unwrap();
    assert_eq!(g.outcome, Outcome::Timeout { nodes: 1 });
}

#[test]
fn two_unit_instance_respects_every_rule() {
    let mut nurses = Vec::new();
    for i in 1..=12 {
        let major = if i % 3 == 0 { MajorShift::Evening } else { MajorShift::Day };
        nurses.push(Nurse::new(format!("a{i}"), Unit::E9, major));
        nurses.push(Nurse::new(format!("b{i}"), Unit::E10, major));
    }
    let mut requests = RequestMap::new();
    requests.insert(&NurseId::new("a2"), 10, ShiftCode::Off);
    requests.insert(&NurseId::new("b3"), 11, ShiftCode::Off);
    requests.insert(&NurseId::new("b4"), 20, ShiftCode::E);

    let scheduler = Scheduler::new(SolverConfig {
        node_budget: 200_000,
        ..SolverConfig::default()
    });
    let g = scheduler.generate(2026, 4, &nurses, &requests).unwrap();
    assert_eq!(g.outcome, Outcome::Feasible, "stats: {:?}", g.stats);
    let roster = g.roster.unwrap();
    assert_labour_rules(&roster);
    assert_eq!(roster.shift(&NurseId::new("a2"), 10), Some(ShiftCode::Off));
    assert_eq!(roster.shift(&NurseId::new("b4"), 20), Some(ShiftCode::E));
    assert!(scheduler
        .check_roster(&roster, &nurses, &requests)
        .unwrap()
        .is_empty());
}

#[test]
fn default_policy_with_full_ward() {
    let mut nurses = Vec::new();
    for i in 1..=9 {
        nurses.push(Nurse::new(format!("9e-{i:02}"), Unit::E9, MajorShift::Day));
    }
    for i in 1..=13 {
        nurses.push(Nurse::new(format!("10e-{i:02}"), Unit::E10, MajorShift::Day));
    }
    let scheduler = Scheduler::new(SolverConfig {
        node_budget: 200_000,
        ..SolverConfig::default()
    });
    let g = scheduler
        .generate(2026, 3, &nurses, &RequestMap::new())
        .unwrap();
    assert_eq!(g.outcome, Outcome::Feasible, "stats: {:?}", g.stats);
    let roster = g.roster.unwrap();
    assert_eq!(roster.schedules().len(), 22);
    assert_labour_rules(&roster);
    assert!(scheduler
        .check_roster(&roster, &nurses, &RequestMap::new())
        .unwrap()
        .is_empty());
    let summary = roster.summary(&nurses);
    assert!(summary.daily.iter().all(|d| d.off == 7));
}

#[test]
fn invalid_inputs_are_rejected_before_search() {
    let nurses = nine_e_nurses(3);
    let empty = RequestMap::new();

    assert!(matches!(
        generate(2026, 2, &[], &empty),
        Err(RosterError::InvalidInput(_))
    ));
    assert!(matches!(
        generate(2026, 13, &nurses, &empty),
        Err(RosterError::InvalidInput(_))
    ));

    let mut dup = nurses.clone();
    dup.push(nurses[0].clone());
    let err = generate(2026, 2, &dup, &empty).unwrap_err();
    assert!(err.to_string().contains("duplicate nurse id: n1"));

    let mut unknown = RequestMap::new();
    unknown.insert(&NurseId::new("ghost"), 3, ShiftCode::Off);
    let err = generate(2026, 2, &nurses, &unknown).unwrap_err();
    assert!(err.to_string().contains("unknown nurse"));

    let mut late = RequestMap::new();
    late.insert(&NurseId::new("n1"), 29, ShiftCode::Off);
    let err = generate(2026, 2, &nurses, &late).unwrap_err();
    assert!(matches!(err, RosterError::InvalidInput(_)));
    assert!(err.to_string().contains("outside month of 28 days"));
}

#[test]
fn outcome_serializes_unmet_as_text() {
    let nurses = nine_e_nurses(3);
    let mut requests = RequestMap::new();
    for n in &nurses {
        requests.insert(&n.id, 2, ShiftCode::Off);
    }
    let g = Scheduler::default()
        .with_template(nine_e_template(1, 0, 0, 0))
        .generate(2026, 2, &nurses, &requests)
        .unwrap();
    let json = serde_json::to_value(&g.outcome).unwrap();
    assert_eq!(json["status"], "Infeasible");
    assert_eq!(
        json["unmet"][0],
        "9E Day coverage unmet on day 2 (required 1, found 0)"
    );
}

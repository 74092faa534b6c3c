use project_evaluation_connector::{
    Caller, Criterion, CriterionKey, DocumentStore, EvaluationError, EvaluationStatus,
    EvaluatorBinding, EvaluatorBindings, EvaluatorRole, InMemoryStore, Project, ProjectDraft,
    ProjectStatus, QuorumPolicy, Rubric, Section, StoreError, User, UserRole,
};
use serde_json::json;
use std::sync::Arc;

const EVALUATORS: [(EvaluatorRole, &str, &str); 3] = [
    (EvaluatorRole::Pv1, "ana", "ana@x.org"),
    (EvaluatorRole::Pv2, "bo", "bo@x.org"),
    (EvaluatorRole::Vk, "cy", "cy@x.org"),
];

fn criterion(description: &str, max_rating: f64) -> Criterion {
    Criterion {
        description: description.to_string(),
        max_rating,
        ..Default::default()
    }
}

fn two_section_rubric() -> Rubric {
    Rubric::new(vec![
        Section {
            section: "Design".into(),
            weight: 0.5,
            criteria: vec![criterion("Clarity", 10.0), criterion("Feasibility", 10.0)],
        },
        Section {
            section: "Impact".into(),
            weight: 0.5,
            criteria: vec![criterion("Reach", 4.0)],
        },
    ])
}

fn admin() -> Caller {
    Caller::admin("root", "root@x.org")
}

fn evaluator(role: EvaluatorRole) -> Caller {
    let (_, uid, email) = EVALUATORS
        .iter()
        .find(|(r, _, _)| *r == role)
        .copied()
        .unwrap();
    Caller::evaluator(uid, email)
}

fn setup() -> (Arc<InMemoryStore>, Project) {
    let memory = Arc::new(InMemoryStore::new());
    let mut evaluators = EvaluatorBindings::new();
    for (role, uid, email) in EVALUATORS {
        memory
            .insert_user(&User::new(uid, email, UserRole::Evaluator))
            .unwrap();
        evaluators.bind(role, EvaluatorBinding::new(email, uid));
    }
    let draft = ProjectDraft {
        project_name: "Bridge".into(),
        project_description: "Pedestrian bridge".into(),
        evaluation_table: two_section_rubric(),
        evaluators,
    };
    let store: Arc<dyn DocumentStore> = memory.clone();
    let (project, report) = draft.create(store, &admin()).unwrap();
    assert!(report.is_complete());
    (memory, project)
}

fn rate_all(project: &mut Project, role: EvaluatorRole, fraction: f64) {
    let caller = evaluator(role);
    let keys: Vec<(CriterionKey, f64)> = project
        .rubric()
        .keys()
        .map(|key| (key, project.rubric().criterion(key).unwrap().max_rating * fraction))
        .collect();
    for (key, value) in keys {
        project.record_rating(&caller, role, key, value).unwrap();
    }
}

#[test]
fn full_evaluation_round() {
    let (memory, mut project) = setup();
    assert_eq!(project.status(), ProjectStatus::Pending);
    assert_eq!(project.completion_percentage(), 0);

    rate_all(&mut project, EvaluatorRole::Pv1, 1.0);
    project
        .record_justification(
            &evaluator(EvaluatorRole::Pv1),
            EvaluatorRole::Pv1,
            CriterionKey::new(0, 0),
            "Clear drawings",
        )
        .unwrap();
    project.submit(&evaluator(EvaluatorRole::Pv1), EvaluatorRole::Pv1).unwrap();

    rate_all(&mut project, EvaluatorRole::Pv2, 0.5);
    project.submit(&evaluator(EvaluatorRole::Pv2), EvaluatorRole::Pv2).unwrap();

    // Scenario D: two completed, one in progress.
    rate_all(&mut project, EvaluatorRole::Vk, 0.25);
    project
        .save_draft(&evaluator(EvaluatorRole::Vk), EvaluatorRole::Vk)
        .unwrap();
    assert_eq!(project.status(), ProjectStatus::InProgress);
    assert_eq!(project.completion_percentage(), 83);
    assert_eq!(
        project.results(QuorumPolicy::default()),
        Err(EvaluationError::QuorumNotMet {
            completed: 2,
            required: 3
        })
    );

    project.submit(&evaluator(EvaluatorRole::Vk), EvaluatorRole::Vk).unwrap();
    assert_eq!(project.status(), ProjectStatus::Completed);
    assert_eq!(project.completion_percentage(), 100);

    let results = project.results(QuorumPolicy::default()).unwrap();
    assert_eq!(results.cards[&EvaluatorRole::Pv1].overall, 100.0);
    assert_eq!(results.cards[&EvaluatorRole::Pv2].overall, 50.0);
    assert_eq!(results.cards[&EvaluatorRole::Vk].overall, 25.0);

    let report = project.score_report(QuorumPolicy::default()).unwrap();
    assert_eq!(report.overall_mean, Some(58));
    assert_eq!(report.sections[0].weight_percent, 50);
    assert_eq!(report.rows().len(), 9);

    // Another session sees the same state.
    let reloaded = Project::load(project.store().clone(), project.id()).unwrap();
    assert_eq!(reloaded.document, project.document);
    let raw = memory.raw("projects", project.id()).unwrap();
    assert_eq!(raw["evaluations"]["PV1"]["status"], json!("completed"));
    assert_eq!(raw["evaluations"]["PV1"]["ratings"]["0-0"], json!(10.0));
    assert_eq!(raw["evaluatorCountAtStart"], json!(3));
}

#[test]
fn scenario_b_two_equal_sections() {
    let (_, mut project) = setup();
    let pv1 = evaluator(EvaluatorRole::Pv1);
    for (key, value) in [
        (CriterionKey::new(0, 0), 5.0),
        (CriterionKey::new(0, 1), 5.0),
        (CriterionKey::new(1, 0), 4.0),
    ] {
        project
            .record_rating(&pv1, EvaluatorRole::Pv1, key, value)
            .unwrap();
    }
    let record = project.record(EvaluatorRole::Pv1).unwrap();
    let card = project_evaluation_connector::score(project.rubric(), &record.ratings);
    assert_eq!(card.sections[0].percentage, 50.0);
    assert_eq!(card.sections[1].percentage, 100.0);
    assert_eq!(card.overall, 75.0);
}

#[test]
fn scenario_e_removed_section_leaves_orphan_rating() {
    let (_, mut project) = setup();
    rate_all(&mut project, EvaluatorRole::Pv1, 0.5);
    project
        .record_rating(
            &evaluator(EvaluatorRole::Pv1),
            EvaluatorRole::Pv1,
            CriterionKey::new(1, 0),
            4.0,
        )
        .unwrap();
    project.submit(&evaluator(EvaluatorRole::Pv1), EvaluatorRole::Pv1).unwrap();

    project.edit_rubric(&admin(), |rubric| rubric.remove_section(0)).unwrap();

    let record = project.record(EvaluatorRole::Pv1).unwrap().clone();
    let card = project_evaluation_connector::score(project.rubric(), &record.ratings);
    assert_eq!(card.sections.len(), 1);
    // The old "1-0" rating is now orphaned and section 0 ("Impact") reads "0-0" = 5 of 4.
    assert_eq!(card.overall, 100.0);
    assert_eq!(
        project_evaluation_connector::scoring::orphaned_keys(project.rubric(), &record.ratings),
        vec![CriterionKey::new(0, 1), CriterionKey::new(1, 0)]
    );
}

#[test]
fn quorum_opens_exactly_at_three_completed() {
    let (_, mut project) = setup();
    let completed_so_far = |project: &Project| match project.results(QuorumPolicy::default()) {
        Ok(_) => None,
        Err(EvaluationError::QuorumNotMet { completed, .. }) => Some(completed),
        Err(e) => panic!("unexpected error {}", e),
    };
    assert_eq!(completed_so_far(&project), Some(0));
    for (n, (role, _, _)) in EVALUATORS.iter().enumerate() {
        project.submit(&evaluator(*role), *role).unwrap();
        if n < 2 {
            assert_eq!(completed_so_far(&project), Some(n + 1));
        }
    }
    assert_eq!(completed_so_far(&project), None);
}

#[test]
fn evaluators_only_touch_their_own_record() {
    let (_, mut project) = setup();
    let pv1 = evaluator(EvaluatorRole::Pv1);
    let outsider = Caller::evaluator("zed", "zed@x.org");

    assert!(matches!(
        project.record_rating(&pv1, EvaluatorRole::Vk, CriterionKey::new(0, 0), 1.0),
        Err(EvaluationError::Unauthorized { .. })
    ));
    assert!(matches!(
        project.submit(&outsider, EvaluatorRole::Pv1),
        Err(EvaluationError::Unauthorized { .. })
    ));
    assert_eq!(project.evaluator_status(EvaluatorRole::Vk), EvaluationStatus::Pending);
    assert_eq!(project.roles_of(&pv1), vec![EvaluatorRole::Pv1]);

    // Admin overrides a finalized record.
    project.submit(&pv1, EvaluatorRole::Pv1).unwrap();
    assert!(project
        .record_rating(&admin(), EvaluatorRole::Pv1, CriterionKey::new(0, 0), 9.0)
        .is_ok());
    assert!(project.record(EvaluatorRole::Pv1).unwrap().is_completed());
}

#[test]
fn evaluators_see_only_assigned_projects() {
    let (memory, project) = setup();
    let other = ProjectDraft {
        project_name: "Tunnel".into(),
        ..Default::default()
    };
    let store: Arc<dyn DocumentStore> = memory.clone();
    other.create(store, &admin()).unwrap();

    let mine = memory
        .fetch_projects_for_caller(&evaluator(EvaluatorRole::Pv2))
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, project.id());
    assert_eq!(memory.fetch_projects_for_caller(&admin()).unwrap().len(), 2);

    // A deleted project left in assignedProjects is skipped.
    let id = project.id().to_string();
    project.delete(&admin()).unwrap();
    assert!(memory
        .fetch_projects_for_caller(&evaluator(EvaluatorRole::Pv2))
        .unwrap()
        .is_empty());
    assert!(memory.fetch_user("bo").unwrap().is_assigned_to(&id));
}

#[test]
fn rebinding_is_idempotent_and_partial_failures_retry() {
    let (memory, mut project) = setup();
    let bindings = project.document.evaluators.clone();
    let report = project.assign_evaluators(&admin(), bindings.clone()).unwrap();
    assert!(report.is_complete());
    assert_eq!(memory.fetch_user("ana").unwrap().assigned_projects.len(), 1);

    memory
        .insert_user(&User::new("dee", "dee@x.org", UserRole::Evaluator))
        .unwrap();
    memory.fail_user_updates("dee");
    let mut changed = bindings;
    changed.bind(EvaluatorRole::Vk, EvaluatorBinding::new("dee@x.org", ""));
    let report = project.assign_evaluators(&admin(), changed).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].uid, "dee");
    // The project side of the change went through.
    let stored = memory.fetch_project(project.id()).unwrap();
    assert_eq!(stored.evaluators.get(EvaluatorRole::Vk).unwrap().uid, "dee");
    assert!(!memory.fetch_user("cy").unwrap().is_assigned_to(project.id()));

    memory.restore_user_updates("dee");
    let retried = report.retry(memory.as_ref()).unwrap();
    assert!(retried.is_complete());
    assert!(memory.fetch_user("dee").unwrap().is_assigned_to(project.id()));
}

#[test]
fn non_admin_cannot_manage_projects() {
    let (_, mut project) = setup();
    let pv1 = evaluator(EvaluatorRole::Pv1);
    assert_eq!(
        project.assign_evaluators(&pv1, EvaluatorBindings::new()),
        Err(EvaluationError::AdminOnly("ana".into()))
    );
    assert!(matches!(
        project.edit_rubric(&pv1, |rubric| rubric.add_section()),
        Err(EvaluationError::AdminOnly(_))
    ));
    assert!(matches!(
        project.clone().delete(&pv1),
        Err(EvaluationError::AdminOnly(_))
    ));
}

#[test]
fn store_failures_surface_as_store_errors() {
    let (memory, mut project) = setup();
    memory.delete_project(project.id()).unwrap();
    assert_eq!(
        project.save_draft(&evaluator(EvaluatorRole::Pv1), EvaluatorRole::Pv1),
        Err(EvaluationError::Store(StoreError::NotFound(format!(
            "projects/{}",
            project.id()
        ))))
    );
}

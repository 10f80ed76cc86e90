use speculate2::speculate;

speculate! {
    use pmboard_core::models::*;
    use pmboard_core::{Board, Database};
    use serde_json::json;
    use uuid::Uuid;

    fn setup_db() -> Database {
        let db = Database::open_memory().expect("Failed to create test database");
        db.migrate().expect("Failed to migrate test database");
        db
    }

    fn create_test_project(db: &Database, name: &str) -> Project {
        db.create_project(CreateProjectInput {
            name: name.into(),
            ..Default::default()
        })
        .expect("Failed to create project")
    }

    fn create_test_feature(db: &Database, project_id: Uuid, title: &str, status: FeatureStatus) -> Feature {
        Board::human(db)
            .create_feature(project_id, CreateFeatureInput {
                title: title.into(),
                status: Some(status),
                ..Default::default()
            })
            .expect("Failed to create feature")
            .0
    }

    fn column(db: &Database, project_id: Uuid, status: FeatureStatus) -> Vec<(String, i64)> {
        db.list_features(&FeatureFilter {
            project_id: Some(project_id),
            status: Some(status),
            ..Default::default()
        })
        .unwrap()
        .into_iter()
        .map(|f| (f.feature.title, f.feature.position))
        .collect()
    }

    describe "board workflow" {
        it "moves a feature across columns and records one status change" {
            let db = setup_db();
            let project = create_test_project(&db, "P");
            let f1 = create_test_feature(&db, project.id, "F1", FeatureStatus::Backlog);
            let f2 = create_test_feature(&db, project.id, "F2", FeatureStatus::Backlog);
            assert_eq!(f1.position, 0);
            assert_eq!(f2.position, 1);

            let moved = Board::human(&db)
                .move_feature(f1.id, FeatureStatus::Todo, 0)
                .unwrap()
                .unwrap();
            assert_eq!(moved.status, FeatureStatus::Todo);
            assert_eq!(moved.position, 0);

            let f2 = db.get_feature(f2.id).unwrap().unwrap();
            assert_eq!(f2.status, FeatureStatus::Backlog);
            assert_eq!(f2.position, 1);

            let status_changes: Vec<ChangeLogEntry> = db
                .recent_changes(project.id, 50)
                .unwrap()
                .into_iter()
                .filter(|e| e.action == ChangeAction::StatusChanged)
                .collect();
            assert_eq!(status_changes.len(), 1);
            assert_eq!(status_changes[0].feature_id, Some(f1.id));
            assert_eq!(status_changes[0].meta, Some(json!({ "from": "BACKLOG", "to": "TODO" })));
        }

        it "does not record a status change for a reorder within a column" {
            let db = setup_db();
            let project = create_test_project(&db, "P");
            let a = create_test_feature(&db, project.id, "A", FeatureStatus::Todo);
            create_test_feature(&db, project.id, "B", FeatureStatus::Todo);

            Board::human(&db).move_feature(a.id, FeatureStatus::Todo, 1).unwrap();

            let changes = db.recent_changes(project.id, 50).unwrap();
            assert!(changes.iter().all(|e| e.action != ChangeAction::StatusChanged));
        }
    }

    describe "position density" {
        it "keeps a column dense after repeated reorders" {
            let db = setup_db();
            let project = create_test_project(&db, "P");
            let ids: Vec<Uuid> = ["A", "B", "C", "D"]
                .iter()
                .map(|t| create_test_feature(&db, project.id, t, FeatureStatus::Todo).id)
                .collect();

            let board = Board::human(&db);
            board.move_feature(ids[0], FeatureStatus::Todo, 3).unwrap();
            board.move_feature(ids[3], FeatureStatus::Todo, 0).unwrap();
            board.move_feature(ids[1], FeatureStatus::Todo, 99).unwrap();

            let positions: Vec<i64> = column(&db, project.id, FeatureStatus::Todo)
                .into_iter()
                .map(|(_, p)| p)
                .collect();
            assert_eq!(positions, vec![0, 1, 2, 3]);
            assert_eq!(
                column(&db, project.id, FeatureStatus::Todo)
                    .into_iter()
                    .map(|(t, _)| t)
                    .collect::<Vec<_>>(),
                vec!["D", "C", "A", "B"]
            );
        }

        it "inserts into the middle of a target column" {
            let db = setup_db();
            let project = create_test_project(&db, "P");
            create_test_feature(&db, project.id, "T0", FeatureStatus::Todo);
            create_test_feature(&db, project.id, "T1", FeatureStatus::Todo);
            let moving = create_test_feature(&db, project.id, "X", FeatureStatus::Backlog);

            Board::human(&db).move_feature(moving.id, FeatureStatus::Todo, 1).unwrap();

            assert_eq!(
                column(&db, project.id, FeatureStatus::Todo),
                vec![("T0".into(), 0), ("X".into(), 1), ("T1".into(), 2)]
            );
        }
    }

    describe "changelog" {
        it "keeps entries after the feature is deleted" {
            let db = setup_db();
            let project = create_test_project(&db, "P");
            let feature = create_test_feature(&db, project.id, "Doomed", FeatureStatus::Backlog);

            Board::human(&db).delete_feature(feature.id).unwrap();

            let entries = db.recent_changes(project.id, 50).unwrap();
            assert_eq!(entries[0].action, ChangeAction::FeatureDeleted);
            assert_eq!(entries[0].summary, "Feature deleted: \"Doomed\"");
            assert_eq!(entries.len(), 2);
        }

        it "collapses repeated entries when reading a deduped page" {
            let db = setup_db();
            let project = create_test_project(&db, "P");
            let feature = create_test_feature(&db, project.id, "F", FeatureStatus::Backlog);
            let board = Board::agent(&db);

            for spec in ["a", "b"] {
                board
                    .update_feature(feature.id, UpdateFeatureInput {
                        priority: Some(Priority::High),
                        spec: Some(Some(spec.into())),
                        ..Default::default()
                    })
                    .unwrap();
                board
                    .update_feature(feature.id, UpdateFeatureInput {
                        priority: Some(Priority::Medium),
                        ..Default::default()
                    })
                    .unwrap();
            }

            let raw = db.changelog_page(project.id, 1, 50, false).unwrap();
            let deduped = db.changelog_page(project.id, 1, 50, true).unwrap();
            assert_eq!(raw.count, 7);
            assert!(deduped.count < raw.count);
            assert_eq!(deduped.total, raw.total);
        }
    }

    describe "context snapshot" {
        it "renders live board state" {
            let db = setup_db();
            let project = create_test_project(&db, "Website");
            let feature = create_test_feature(&db, project.id, "Login", FeatureStatus::InProgress);
            Board::human(&db).create_subtask(feature.id, "form".into()).unwrap();

            let snapshot = pmboard_core::context::ContextSnapshot::load(&db, project.id)
                .unwrap()
                .unwrap();
            let md = snapshot.render_markdown("http://localhost:3000", chrono::Utc::now());

            assert!(md.contains("### In Progress (1)"));
            assert!(md.contains("#### Login"));
            assert!(md.contains("  - [ ] form"));
            assert!(md.contains("Feature created: \"Login\""));
        }

        it "returns nothing for an unknown project" {
            let db = setup_db();
            let snapshot = pmboard_core::context::ContextSnapshot::load(&db, Uuid::new_v4()).unwrap();
            assert!(snapshot.is_none());
        }
    }
}

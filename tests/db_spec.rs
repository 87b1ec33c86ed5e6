use costplan::db::Database;
use costplan::error::EstimateError;
use costplan::models::*;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_project(db: &Database) -> Project {
    db.create_project(CreateProjectInput {
        name: "Test Project".to_string(),
        description: None,
    })
    .expect("Failed to create project")
}

fn stage_input(name: &str) -> CreateStageInput {
    CreateStageInput {
        parent_id: None,
        name: name.to_string(),
        code: None,
    }
}

fn task_input(name: &str) -> CreateTaskInput {
    CreateTaskInput {
        parent_id: None,
        name: name.to_string(),
        code: None,
        volume: None,
        unit_id: None,
        is_group: false,
    }
}

fn resource_input(name: &str, volume: f64, price: f64, markup: f64) -> CreateResourceInput {
    CreateResourceInput {
        name: name.to_string(),
        code: None,
        resource_type: ResourceType::Material,
        unit_id: None,
        volume: Some(volume),
        price,
        markup,
        url: None,
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        describe "create_project" {
            it "creates a project with required fields" {
                let project = db.create_project(CreateProjectInput {
                    name: "Osiedle Zielone".to_string(),
                    description: None,
                }).expect("Failed to create project");

                assert_eq!(project.name, "Osiedle Zielone");
                assert!(project.description.is_none());
            }

            it "rejects a blank name" {
                let err = db.create_project(CreateProjectInput {
                    name: "   ".to_string(),
                    description: None,
                }).unwrap_err();

                assert!(matches!(err, EstimateError::Validation(_)));
            }
        }

        describe "get_project" {
            it "returns None for non-existent project" {
                let result = db.get_project(Uuid::new_v4()).expect("Query failed");
                assert!(result.is_none());
            }

            it "returns the project by id" {
                let created = create_test_project(&db);
                let found = db.get_project(created.id).expect("Query failed");
                assert!(found.is_some());
                assert_eq!(found.unwrap().name, "Test Project");
            }
        }

        describe "delete_project" {
            it "removes the whole estimate with the project" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Roboty ziemne")).expect("Failed to create stage");
                let task = db.create_task(stage.id, task_input("Wykopy")).expect("Failed to create task");
                db.create_resource(task.id, resource_input("Koparka", 8.0, 120.0, 10.0)).expect("Failed to create resource");

                db.delete_project(project.id).expect("Failed to delete");

                assert!(db.get_project(project.id).expect("Query failed").is_none());
                assert!(db.get_stage(stage.id).expect("Query failed").is_none());
                assert!(db.get_task(task.id).expect("Query failed").is_none());
                assert!(db.list_resources(project.id).expect("Query failed").is_empty());
            }

            it "fails with NotFound for a non-existent project" {
                let err = db.delete_project(Uuid::new_v4()).unwrap_err();
                assert!(matches!(err, EstimateError::NotFound { .. }));
            }
        }
    }

    describe "stages" {
        describe "create_stage" {
            it "rejects a blank name" {
                let project = create_test_project(&db);
                let err = db.create_stage(project.id, stage_input("  ")).unwrap_err();
                assert!(matches!(err, EstimateError::Validation(_)));
            }

            it "fails with NotFound when the project does not exist" {
                let err = db.create_stage(Uuid::new_v4(), stage_input("Orphan")).unwrap_err();
                assert!(matches!(err, EstimateError::NotFound { .. }));
            }

            it "appends siblings in insertion order" {
                let project = create_test_project(&db);
                let first = db.create_stage(project.id, stage_input("First")).expect("Failed");
                let second = db.create_stage(project.id, stage_input("Second")).expect("Failed");

                assert_eq!(first.sort_order, 0);
                assert_eq!(second.sort_order, 1);

                let stages = db.list_stages(project.id).expect("Query failed");
                assert_eq!(stages[0].name, "First");
                assert_eq!(stages[1].name, "Second");
            }

            it "derives sort order per parent, not per project" {
                let project = create_test_project(&db);
                let root = db.create_stage(project.id, stage_input("Root")).expect("Failed");
                let _sibling = db.create_stage(project.id, stage_input("Sibling")).expect("Failed");

                let child = db.create_stage(project.id, CreateStageInput {
                    parent_id: Some(root.id),
                    name: "Child".to_string(),
                    code: None,
                }).expect("Failed");

                // First child under root starts at 0 even though two roots exist.
                assert_eq!(child.sort_order, 0);
            }
        }

        describe "update_stage" {
            it "updates only provided fields" {
                let project = create_test_project(&db);
                let created = db.create_stage(project.id, CreateStageInput {
                    parent_id: None,
                    name: "Original".to_string(),
                    code: Some("ST-01".to_string()),
                }).expect("Failed");

                let updated = db.update_stage(created.id, UpdateStageInput {
                    parent_id: None,
                    name: Some("Renamed".to_string()),
                    code: None,
                }).expect("Update failed");

                assert_eq!(updated.name, "Renamed");
                assert_eq!(updated.code, Some("ST-01".to_string()));
            }

            it "fails with NotFound for a non-existent stage" {
                let err = db.update_stage(Uuid::new_v4(), UpdateStageInput {
                    parent_id: None,
                    name: Some("Ghost".to_string()),
                    code: None,
                }).unwrap_err();

                assert!(matches!(err, EstimateError::NotFound { .. }));
            }

            it "rejects moving a stage under its own descendant" {
                let project = create_test_project(&db);
                let root = db.create_stage(project.id, stage_input("Root")).expect("Failed");
                let child = db.create_stage(project.id, CreateStageInput {
                    parent_id: Some(root.id),
                    name: "Child".to_string(),
                    code: None,
                }).expect("Failed");

                let err = db.update_stage(root.id, UpdateStageInput {
                    parent_id: Some(child.id),
                    name: None,
                    code: None,
                }).unwrap_err();

                assert!(matches!(err, EstimateError::Validation(_)));
            }
        }

        describe "delete_stage" {
            it "cascades over exactly the transitive descendants" {
                let project = create_test_project(&db);
                let doomed = db.create_stage(project.id, stage_input("Doomed")).expect("Failed");
                let doomed_child = db.create_stage(project.id, CreateStageInput {
                    parent_id: Some(doomed.id),
                    name: "Doomed Child".to_string(),
                    code: None,
                }).expect("Failed");
                let doomed_task = db.create_task(doomed_child.id, task_input("Doomed Task")).expect("Failed");
                db.create_resource(doomed_task.id, resource_input("Doomed Resource", 1.0, 10.0, 0.0)).expect("Failed");

                let survivor = db.create_stage(project.id, stage_input("Survivor")).expect("Failed");
                let survivor_task = db.create_task(survivor.id, task_input("Survivor Task")).expect("Failed");
                let survivor_resource = db.create_resource(survivor_task.id, resource_input("Survivor Resource", 2.0, 5.0, 0.0)).expect("Failed");

                db.delete_stage(doomed.id).expect("Failed to delete");

                assert!(db.get_stage(doomed.id).expect("Query failed").is_none());
                assert!(db.get_stage(doomed_child.id).expect("Query failed").is_none());
                assert!(db.get_task(doomed_task.id).expect("Query failed").is_none());

                let resources = db.list_resources(project.id).expect("Query failed");
                assert_eq!(resources.len(), 1);
                assert_eq!(resources[0].id, survivor_resource.id);
                assert!(db.get_stage(survivor.id).expect("Query failed").is_some());
            }

            it "fails with NotFound for a non-existent stage" {
                let err = db.delete_stage(Uuid::new_v4()).unwrap_err();
                assert!(matches!(err, EstimateError::NotFound { .. }));
            }
        }
    }

    describe "tasks" {
        describe "create_task" {
            it "defaults volume to 1" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Murowanie")).expect("Failed");

                assert_eq!(task.volume, 1.0);
                assert_eq!(task.calc_mode, CalcMode::ByResources);
                assert_eq!(task.project_id, project.id);
            }

            it "rejects a negative volume" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");

                let err = db.create_task(stage.id, CreateTaskInput {
                    volume: Some(-2.0),
                    ..task_input("Bad")
                }).unwrap_err();

                assert!(matches!(err, EstimateError::Validation(_)));
            }

            it "rejects a blank name" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");

                let err = db.create_task(stage.id, task_input("")).unwrap_err();
                assert!(matches!(err, EstimateError::Validation(_)));
            }

            it "nests a task under a parent task" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let parent = db.create_task(stage.id, task_input("Parent")).expect("Failed");

                let child = db.create_task(stage.id, CreateTaskInput {
                    parent_id: Some(parent.id),
                    ..task_input("Child")
                }).expect("Failed");

                assert_eq!(child.parent_id, Some(parent.id));
                assert_eq!(child.stage_id, stage.id);
            }
        }

        describe "delete_task" {
            it "cascades over descendant tasks and their resources" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let parent = db.create_task(stage.id, task_input("Parent")).expect("Failed");
                let child = db.create_task(stage.id, CreateTaskInput {
                    parent_id: Some(parent.id),
                    ..task_input("Child")
                }).expect("Failed");
                db.create_resource(child.id, resource_input("Nested", 1.0, 100.0, 0.0)).expect("Failed");

                let other = db.create_task(stage.id, task_input("Other")).expect("Failed");
                let kept = db.create_resource(other.id, resource_input("Kept", 1.0, 50.0, 0.0)).expect("Failed");

                db.delete_task(parent.id).expect("Failed to delete");

                assert!(db.get_task(parent.id).expect("Query failed").is_none());
                assert!(db.get_task(child.id).expect("Query failed").is_none());

                let resources = db.list_resources(project.id).expect("Query failed");
                assert_eq!(resources.len(), 1);
                assert_eq!(resources[0].id, kept.id);
            }
        }
    }

    describe "resources" {
        describe "create_resource" {
            it "computes the derived fields before persisting" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");

                let resource = db.create_resource(task.id, resource_input("Cegła", 10.0, 5.0, 20.0)).expect("Failed");

                assert_eq!(resource.cost, 50.0);
                assert_eq!(resource.price_with_markup, 6.0);
                assert_eq!(resource.cost_with_markup, 60.0);

                // Stored values match, not just the returned struct.
                let stored = db.get_resource(resource.id).expect("Query failed").unwrap();
                assert_eq!(stored.cost, 50.0);
                assert_eq!(stored.cost_with_markup, 60.0);
            }

            it "rejects a negative price" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");

                let err = db.create_resource(task.id, resource_input("Bad", 1.0, -5.0, 0.0)).unwrap_err();
                assert!(matches!(err, EstimateError::Validation(_)));
            }

            it "fails with NotFound when the task does not exist" {
                let err = db.create_resource(Uuid::new_v4(), resource_input("Orphan", 1.0, 1.0, 0.0)).unwrap_err();
                assert!(matches!(err, EstimateError::NotFound { .. }));
            }
        }

        describe "update_resource" {
            it "recomputes all three derived fields when one base field changes" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");
                let resource = db.create_resource(task.id, resource_input("Beton", 10.0, 5.0, 20.0)).expect("Failed");

                let updated = db.update_resource(resource.id, UpdateResourceInput {
                    name: None,
                    code: None,
                    resource_type: None,
                    unit_id: None,
                    volume: None,
                    price: Some(8.0),
                    markup: None,
                    url: None,
                }).expect("Update failed");

                assert_eq!(updated.cost, 80.0);
                assert!((updated.price_with_markup - 9.6).abs() < 1e-9);
                assert!((updated.cost_with_markup - 96.0).abs() < 1e-9);

                let stored = db.get_resource(resource.id).expect("Query failed").unwrap();
                assert_eq!(stored.cost, stored.volume * stored.price);
            }

            it "a negative markup acts as a discount" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");
                let resource = db.create_resource(task.id, resource_input("Upust", 2.0, 100.0, 0.0)).expect("Failed");

                let updated = db.update_resource(resource.id, UpdateResourceInput {
                    name: None,
                    code: None,
                    resource_type: None,
                    unit_id: None,
                    volume: None,
                    price: None,
                    markup: Some(-50.0),
                    url: None,
                }).expect("Update failed");

                assert_eq!(updated.price_with_markup, 50.0);
                assert_eq!(updated.cost_with_markup, 100.0);
            }

            it "rejects an update that takes volume negative" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");
                let resource = db.create_resource(task.id, resource_input("Ok", 1.0, 1.0, 0.0)).expect("Failed");

                let err = db.update_resource(resource.id, UpdateResourceInput {
                    name: None,
                    code: None,
                    resource_type: None,
                    unit_id: None,
                    volume: Some(-1.0),
                    price: None,
                    markup: None,
                    url: None,
                }).unwrap_err();

                assert!(matches!(err, EstimateError::Validation(_)));

                // Nothing was applied.
                let stored = db.get_resource(resource.id).expect("Query failed").unwrap();
                assert_eq!(stored.volume, 1.0);
            }
        }

        describe "delete_resource" {
            it "removes only the leaf" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");
                let resource = db.create_resource(task.id, resource_input("Gone", 1.0, 1.0, 0.0)).expect("Failed");

                db.delete_resource(resource.id).expect("Failed to delete");

                assert!(db.get_resource(resource.id).expect("Query failed").is_none());
                assert!(db.get_task(task.id).expect("Query failed").is_some());
            }

            it "fails with NotFound for a non-existent resource" {
                let err = db.delete_resource(Uuid::new_v4()).unwrap_err();
                assert!(matches!(err, EstimateError::NotFound { .. }));
            }
        }
    }

    describe "markups" {
        it "appends markups in sort order" {
            let project = create_test_project(&db);
            let first = db.create_markup(project.id, CreateMarkupInput {
                name: "Overhead".to_string(),
                value: 10.0,
                kind: MarkupKind::Percent,
                is_tax: false,
            }).expect("Failed");
            let second = db.create_markup(project.id, CreateMarkupInput {
                name: "VAT".to_string(),
                value: 23.0,
                kind: MarkupKind::Percent,
                is_tax: true,
            }).expect("Failed");

            assert_eq!(first.sort_order, 0);
            assert_eq!(second.sort_order, 1);

            let markups = db.list_markups(project.id).expect("Query failed");
            assert_eq!(markups[0].name, "Overhead");
            assert_eq!(markups[1].name, "VAT");
        }

        it "deleting a markup leaves the tree untouched" {
            let project = create_test_project(&db);
            let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
            let task = db.create_task(stage.id, task_input("Task")).expect("Failed");
            db.create_resource(task.id, resource_input("R", 1.0, 100.0, 0.0)).expect("Failed");

            let markup = db.create_markup(project.id, CreateMarkupInput {
                name: "VAT".to_string(),
                value: 23.0,
                kind: MarkupKind::Percent,
                is_tax: true,
            }).expect("Failed");

            db.delete_markup(markup.id).expect("Failed to delete");

            let summary = db.get_estimate_summary(project.id).expect("Summary failed");
            assert_eq!(summary.tax, 0.0);
            assert_eq!(summary.grand_total, 100.0);
            assert_eq!(db.list_resources(project.id).expect("Query failed").len(), 1);
        }
    }

    describe "estimate reads" {
        describe "get_estimate_tree" {
            it "nests stages, tasks and resources" {
                let project = create_test_project(&db);
                let root = db.create_stage(project.id, stage_input("Root")).expect("Failed");
                let child = db.create_stage(project.id, CreateStageInput {
                    parent_id: Some(root.id),
                    name: "Child".to_string(),
                    code: None,
                }).expect("Failed");
                let task = db.create_task(child.id, task_input("Task")).expect("Failed");
                db.create_resource(task.id, resource_input("R", 1.0, 10.0, 0.0)).expect("Failed");

                let forest = db.get_estimate_tree(project.id).expect("Tree failed");

                assert_eq!(forest.len(), 1);
                assert_eq!(forest[0].stage.id, root.id);
                assert_eq!(forest[0].children.len(), 1);
                assert_eq!(forest[0].children[0].tasks.len(), 1);
                assert_eq!(forest[0].children[0].tasks[0].resources.len(), 1);
            }

            it "treats a task with a dangling parent as a stage root" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let orphan = db.create_task(stage.id, CreateTaskInput {
                    parent_id: Some(Uuid::new_v4()),
                    ..task_input("Orphan")
                }).expect("Failed");

                let forest = db.get_estimate_tree(project.id).expect("Tree failed");

                assert_eq!(forest[0].tasks.len(), 1);
                assert_eq!(forest[0].tasks[0].task.id, orphan.id);
            }

            it "fails with NotFound for a non-existent project" {
                let err = db.get_estimate_tree(Uuid::new_v4()).unwrap_err();
                assert!(matches!(err, EstimateError::NotFound { .. }));
            }
        }

        describe "get_estimate_summary" {
            it "computes the full scenario end to end" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");
                db.create_resource(task.id, resource_input("R", 10.0, 5.0, 20.0)).expect("Failed");
                db.create_markup(project.id, CreateMarkupInput {
                    name: "VAT".to_string(),
                    value: 23.0,
                    kind: MarkupKind::Percent,
                    is_tax: true,
                }).expect("Failed");

                let summary = db.get_estimate_summary(project.id).expect("Summary failed");

                assert_eq!(summary.subtotal, 50.0);
                assert_eq!(summary.subtotal_with_markup, 60.0);
                assert!((summary.tax - 13.8).abs() < 1e-9);
                assert!((summary.grand_total - 73.8).abs() < 1e-9);
            }

            it "reflects a mutation on the next read" {
                let project = create_test_project(&db);
                let stage = db.create_stage(project.id, stage_input("Stage")).expect("Failed");
                let task = db.create_task(stage.id, task_input("Task")).expect("Failed");
                let resource = db.create_resource(task.id, resource_input("R", 10.0, 5.0, 0.0)).expect("Failed");

                let before = db.get_estimate_summary(project.id).expect("Summary failed");
                assert_eq!(before.grand_total, 50.0);

                db.update_resource(resource.id, UpdateResourceInput {
                    name: None,
                    code: None,
                    resource_type: None,
                    unit_id: None,
                    volume: Some(20.0),
                    price: None,
                    markup: None,
                    url: None,
                }).expect("Update failed");

                let after = db.get_estimate_summary(project.id).expect("Summary failed");
                assert_eq!(after.grand_total, 100.0);
            }
        }
    }
}

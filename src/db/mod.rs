mod schema;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{EstimateError, Result};
use crate::estimate::{self, EstimateSummary};
use crate::models::*;

/// Handle to the estimate store.
///
/// A single connection behind a mutex: the core computation model is
/// synchronous and single-writer, and every mutation is followed by a full
/// reload of the affected project's rows, so connection-level serialization
/// is the only coordination needed.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", false)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "costplan")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("costplan.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", false)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects ORDER BY name",
        )?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects WHERE id = ?",
        )?;

        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(project_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let name = require_name("project", &input.name)?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &name,
                &input.description,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id,
            name,
            description: input.description,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Project> {
        let existing = self
            .get_project(id)?
            .ok_or(EstimateError::not_found("project", id))?;

        let name = match input.name {
            Some(name) => require_name("project", &name)?,
            None => existing.name,
        };
        let description = input.description.or(existing.description);

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        conn.execute(
            "UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?",
            (&name, &description, now.to_rfc3339(), id.to_string()),
        )?;

        Ok(Project {
            id,
            name,
            description,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a project and everything under it, atomically.
    pub fn delete_project(&self, id: Uuid) -> Result<()> {
        self.get_project(id)?
            .ok_or(EstimateError::not_found("project", id))?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction().map_err(cascade_error)?;

        let key = id.to_string();
        tx.execute("DELETE FROM estimate_markups WHERE project_id = ?", [&key])
            .map_err(cascade_error)?;
        tx.execute(
            "DELETE FROM estimate_resources WHERE project_id = ?",
            [&key],
        )
        .map_err(cascade_error)?;
        tx.execute("DELETE FROM estimate_tasks WHERE project_id = ?", [&key])
            .map_err(cascade_error)?;
        tx.execute("DELETE FROM estimate_stages WHERE project_id = ?", [&key])
            .map_err(cascade_error)?;
        tx.execute("DELETE FROM projects WHERE id = ?", [&key])
            .map_err(cascade_error)?;

        tx.commit().map_err(cascade_error)
    }

    // ============================================================
    // Unit-of-measure operations
    // ============================================================

    pub fn list_units(&self) -> Result<Vec<UnitMeasure>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT id, code, name FROM unit_measures ORDER BY code")?;

        let units = stmt
            .query_map([], |row| {
                Ok(UnitMeasure {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    code: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(units)
    }

    pub fn create_unit(&self, input: CreateUnitInput) -> Result<UnitMeasure> {
        let code = require_name("unit", &input.code)?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO unit_measures (id, code, name) VALUES (?, ?, ?)",
            (id.to_string(), &code, &input.name),
        )?;

        Ok(UnitMeasure {
            id,
            code,
            name: input.name,
        })
    }

    // ============================================================
    // Stage operations
    // ============================================================

    pub fn list_stages(&self, project_id: Uuid) -> Result<Vec<Stage>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, parent_id, name, code, sort_order, created_at, updated_at
             FROM estimate_stages WHERE project_id = ? ORDER BY sort_order, created_at",
        )?;

        let stages = stmt
            .query_map([project_id.to_string()], stage_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stages)
    }

    pub fn get_stage(&self, id: Uuid) -> Result<Option<Stage>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, parent_id, name, code, sort_order, created_at, updated_at
             FROM estimate_stages WHERE id = ?",
        )?;

        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(stage_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn create_stage(&self, project_id: Uuid, input: CreateStageInput) -> Result<Stage> {
        let name = require_name("stage", &input.name)?;
        self.get_project(project_id)?
            .ok_or(EstimateError::not_found("project", project_id))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        // Append after the current siblings under the same parent.
        let sort_order: i64 = conn.query_row(
            "SELECT COUNT(*) FROM estimate_stages WHERE project_id = ? AND parent_id IS ?",
            (
                project_id.to_string(),
                input.parent_id.map(|u| u.to_string()),
            ),
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO estimate_stages (id, project_id, parent_id, name, code, sort_order, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                input.parent_id.map(|u| u.to_string()),
                &name,
                &input.code,
                sort_order,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Stage {
            id,
            project_id,
            parent_id: input.parent_id,
            name,
            code: input.code,
            sort_order,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_stage(&self, id: Uuid, input: UpdateStageInput) -> Result<Stage> {
        let existing = self
            .get_stage(id)?
            .ok_or(EstimateError::not_found("stage", id))?;

        let name = match input.name {
            Some(name) => require_name("stage", &name)?,
            None => existing.name,
        };
        let code = input.code.or(existing.code);
        let parent_id = input.parent_id.or(existing.parent_id);

        if let Some(parent) = parent_id {
            self.ensure_stage_parent_acyclic(id, parent, existing.project_id)?;
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        conn.execute(
            "UPDATE estimate_stages SET parent_id = ?, name = ?, code = ?, updated_at = ? WHERE id = ?",
            (
                parent_id.map(|u| u.to_string()),
                &name,
                &code,
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Stage {
            id,
            project_id: existing.project_id,
            parent_id,
            name,
            code,
            sort_order: existing.sort_order,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a stage and cascade over every descendant stage, their tasks
    /// and resources. All-or-nothing: a failure anywhere rolls the whole
    /// cascade back and nothing is removed.
    pub fn delete_stage(&self, id: Uuid) -> Result<()> {
        let stage = self
            .get_stage(id)?
            .ok_or(EstimateError::not_found("stage", id))?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction().map_err(cascade_error)?;

        let subtree = {
            let mut stmt = tx
                .prepare("SELECT id, parent_id FROM estimate_stages WHERE project_id = ?")
                .map_err(cascade_error)?;
            let links = stmt
                .query_map([stage.project_id.to_string()], |row| {
                    Ok((
                        parse_uuid(row.get::<_, String>(0)?),
                        row.get::<_, Option<String>>(1)?.map(parse_uuid),
                    ))
                })
                .map_err(cascade_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(cascade_error)?;
            collect_subtree(id, &links)
        };

        for stage_id in &subtree {
            let key = stage_id.to_string();
            tx.execute(
                "DELETE FROM estimate_resources WHERE task_id IN
                 (SELECT id FROM estimate_tasks WHERE stage_id = ?)",
                [&key],
            )
            .map_err(cascade_error)?;
            tx.execute("DELETE FROM estimate_tasks WHERE stage_id = ?", [&key])
                .map_err(cascade_error)?;
            tx.execute("DELETE FROM estimate_stages WHERE id = ?", [&key])
                .map_err(cascade_error)?;
        }

        tx.commit().map_err(cascade_error)
    }

    /// Reject a parent assignment whose chain would loop back to `id`.
    fn ensure_stage_parent_acyclic(&self, id: Uuid, parent: Uuid, project_id: Uuid) -> Result<()> {
        let links: HashMap<Uuid, Option<Uuid>> = self
            .list_stages(project_id)?
            .into_iter()
            .map(|s| (s.id, s.parent_id))
            .collect();
        ensure_parent_acyclic("stage", id, parent, &links)
    }

    // ============================================================
    // Task operations
    // ============================================================

    pub fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, stage_id, parent_id, name, code, volume, unit_id, is_group, calc_mode, sort_order, created_at, updated_at
             FROM estimate_tasks WHERE project_id = ? ORDER BY sort_order, created_at",
        )?;

        let tasks = stmt
            .query_map([project_id.to_string()], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, stage_id, parent_id, name, code, volume, unit_id, is_group, calc_mode, sort_order, created_at, updated_at
             FROM estimate_tasks WHERE id = ?",
        )?;

        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(task_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn create_task(&self, stage_id: Uuid, input: CreateTaskInput) -> Result<Task> {
        let name = require_name("task", &input.name)?;
        let volume = require_non_negative("task volume", input.volume.unwrap_or(1.0))?;
        let stage = self
            .get_stage(stage_id)?
            .ok_or(EstimateError::not_found("stage", stage_id))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        let sort_order: i64 = conn.query_row(
            "SELECT COUNT(*) FROM estimate_tasks WHERE stage_id = ? AND parent_id IS ?",
            (
                stage_id.to_string(),
                input.parent_id.map(|u| u.to_string()),
            ),
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO estimate_tasks (id, project_id, stage_id, parent_id, name, code, volume, unit_id, is_group, calc_mode, sort_order, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id.to_string(),
                stage.project_id.to_string(),
                stage_id.to_string(),
                input.parent_id.map(|u| u.to_string()),
                &name,
                &input.code,
                volume,
                input.unit_id.map(|u| u.to_string()),
                input.is_group as i32,
                CalcMode::ByResources.as_str(),
                sort_order,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(Task {
            id,
            project_id: stage.project_id,
            stage_id,
            parent_id: input.parent_id,
            name,
            code: input.code,
            volume,
            unit_id: input.unit_id,
            is_group: input.is_group,
            calc_mode: CalcMode::ByResources,
            sort_order,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_task(&self, id: Uuid, input: UpdateTaskInput) -> Result<Task> {
        let existing = self
            .get_task(id)?
            .ok_or(EstimateError::not_found("task", id))?;

        let name = match input.name {
            Some(name) => require_name("task", &name)?,
            None => existing.name,
        };
        let volume = match input.volume {
            Some(volume) => require_non_negative("task volume", volume)?,
            None => existing.volume,
        };
        let code = input.code.or(existing.code);
        let unit_id = input.unit_id.or(existing.unit_id);
        let parent_id = input.parent_id.or(existing.parent_id);
        let is_group = input.is_group.unwrap_or(existing.is_group);

        if let Some(parent) = parent_id {
            let links: HashMap<Uuid, Option<Uuid>> = self
                .list_tasks(existing.project_id)?
                .into_iter()
                .map(|t| (t.id, t.parent_id))
                .collect();
            ensure_parent_acyclic("task", id, parent, &links)?;
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        conn.execute(
            "UPDATE estimate_tasks SET parent_id = ?, name = ?, code = ?, volume = ?, unit_id = ?, is_group = ?, updated_at = ? WHERE id = ?",
            params![
                parent_id.map(|u| u.to_string()),
                &name,
                &code,
                volume,
                unit_id.map(|u| u.to_string()),
                is_group as i32,
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;

        Ok(Task {
            id,
            project_id: existing.project_id,
            stage_id: existing.stage_id,
            parent_id,
            name,
            code,
            volume,
            unit_id,
            is_group,
            calc_mode: existing.calc_mode,
            sort_order: existing.sort_order,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Delete a task and cascade over its descendant tasks and their
    /// resources, atomically.
    pub fn delete_task(&self, id: Uuid) -> Result<()> {
        let task = self
            .get_task(id)?
            .ok_or(EstimateError::not_found("task", id))?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction().map_err(cascade_error)?;

        // Descendant tasks always live in the same stage as their parent.
        let subtree = {
            let mut stmt = tx
                .prepare("SELECT id, parent_id FROM estimate_tasks WHERE stage_id = ?")
                .map_err(cascade_error)?;
            let links = stmt
                .query_map([task.stage_id.to_string()], |row| {
                    Ok((
                        parse_uuid(row.get::<_, String>(0)?),
                        row.get::<_, Option<String>>(1)?.map(parse_uuid),
                    ))
                })
                .map_err(cascade_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(cascade_error)?;
            collect_subtree(id, &links)
        };

        for task_id in &subtree {
            let key = task_id.to_string();
            tx.execute("DELETE FROM estimate_resources WHERE task_id = ?", [&key])
                .map_err(cascade_error)?;
            tx.execute("DELETE FROM estimate_tasks WHERE id = ?", [&key])
                .map_err(cascade_error)?;
        }

        tx.commit().map_err(cascade_error)
    }

    // ============================================================
    // Resource operations
    // ============================================================

    pub fn list_resources(&self, project_id: Uuid) -> Result<Vec<Resource>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, task_id, name, code, resource_type, unit_id, volume, price, markup, cost, price_with_markup, cost_with_markup, url, sort_order, created_at, updated_at
             FROM estimate_resources WHERE project_id = ? ORDER BY sort_order, created_at",
        )?;

        let resources = stmt
            .query_map([project_id.to_string()], resource_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(resources)
    }

    pub fn get_resource(&self, id: Uuid) -> Result<Option<Resource>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, task_id, name, code, resource_type, unit_id, volume, price, markup, cost, price_with_markup, cost_with_markup, url, sort_order, created_at, updated_at
             FROM estimate_resources WHERE id = ?",
        )?;

        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(resource_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn create_resource(&self, task_id: Uuid, input: CreateResourceInput) -> Result<Resource> {
        let name = require_name("resource", &input.name)?;
        let volume = require_non_negative("resource volume", input.volume.unwrap_or(1.0))?;
        let price = require_non_negative("resource price", input.price)?;
        let task = self
            .get_task(task_id)?
            .ok_or(EstimateError::not_found("task", task_id))?;

        let derived = estimate::derive_costs(volume, price, input.markup);

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        let sort_order: i64 = conn.query_row(
            "SELECT COUNT(*) FROM estimate_resources WHERE task_id = ?",
            [task_id.to_string()],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO estimate_resources (id, project_id, task_id, name, code, resource_type, unit_id, volume, price, markup, cost, price_with_markup, cost_with_markup, url, sort_order, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id.to_string(),
                task.project_id.to_string(),
                task_id.to_string(),
                &name,
                &input.code,
                input.resource_type.as_str(),
                input.unit_id.map(|u| u.to_string()),
                volume,
                price,
                input.markup,
                derived.cost,
                derived.price_with_markup,
                derived.cost_with_markup,
                &input.url,
                sort_order,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(Resource {
            id,
            project_id: task.project_id,
            task_id,
            name,
            code: input.code,
            resource_type: input.resource_type,
            unit_id: input.unit_id,
            volume,
            price,
            markup: input.markup,
            cost: derived.cost,
            price_with_markup: derived.price_with_markup,
            cost_with_markup: derived.cost_with_markup,
            url: input.url,
            sort_order,
            created_at: now,
            updated_at: now,
        })
    }

    /// Update a resource's base fields and recompute all three derived
    /// fields from the merged state, in one statement.
    ///
    /// Ancestor totals are stale after this returns; the next tree or
    /// summary read recomputes them.
    pub fn update_resource(&self, id: Uuid, input: UpdateResourceInput) -> Result<Resource> {
        let existing = self
            .get_resource(id)?
            .ok_or(EstimateError::not_found("resource", id))?;

        let name = match input.name {
            Some(name) => require_name("resource", &name)?,
            None => existing.name,
        };
        let volume = match input.volume {
            Some(volume) => require_non_negative("resource volume", volume)?,
            None => existing.volume,
        };
        let price = match input.price {
            Some(price) => require_non_negative("resource price", price)?,
            None => existing.price,
        };
        let markup = input.markup.unwrap_or(existing.markup);
        let code = input.code.or(existing.code);
        let resource_type = input.resource_type.unwrap_or(existing.resource_type);
        let unit_id = input.unit_id.or(existing.unit_id);
        let url = input.url.or(existing.url);

        let derived = estimate::derive_costs(volume, price, markup);

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        conn.execute(
            "UPDATE estimate_resources SET name = ?, code = ?, resource_type = ?, unit_id = ?, volume = ?, price = ?, markup = ?, cost = ?, price_with_markup = ?, cost_with_markup = ?, url = ?, updated_at = ? WHERE id = ?",
            params![
                &name,
                &code,
                resource_type.as_str(),
                unit_id.map(|u| u.to_string()),
                volume,
                price,
                markup,
                derived.cost,
                derived.price_with_markup,
                derived.cost_with_markup,
                &url,
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;

        Ok(Resource {
            id,
            project_id: existing.project_id,
            task_id: existing.task_id,
            name,
            code,
            resource_type,
            unit_id,
            volume,
            price,
            markup,
            cost: derived.cost,
            price_with_markup: derived.price_with_markup,
            cost_with_markup: derived.cost_with_markup,
            url,
            sort_order: existing.sort_order,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    /// Leaf removal, no cascade.
    pub fn delete_resource(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM estimate_resources WHERE id = ?",
            [id.to_string()],
        )?;
        if rows == 0 {
            return Err(EstimateError::not_found("resource", id));
        }
        Ok(())
    }

    // ============================================================
    // Markup operations
    // ============================================================

    pub fn list_markups(&self, project_id: Uuid) -> Result<Vec<Markup>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, value, kind, is_tax, sort_order, created_at
             FROM estimate_markups WHERE project_id = ? ORDER BY sort_order, created_at",
        )?;

        let markups = stmt
            .query_map([project_id.to_string()], markup_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(markups)
    }

    pub fn create_markup(&self, project_id: Uuid, input: CreateMarkupInput) -> Result<Markup> {
        let name = require_name("markup", &input.name)?;
        self.get_project(project_id)?
            .ok_or(EstimateError::not_found("project", project_id))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        let sort_order: i64 = conn.query_row(
            "SELECT COUNT(*) FROM estimate_markups WHERE project_id = ?",
            [project_id.to_string()],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO estimate_markups (id, project_id, name, value, kind, is_tax, sort_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                &name,
                input.value,
                input.kind.as_str(),
                input.is_tax as i32,
                sort_order,
                now.to_rfc3339(),
            ),
        )?;

        Ok(Markup {
            id,
            project_id,
            name,
            value: input.value,
            kind: input.kind,
            is_tax: input.is_tax,
            sort_order,
            created_at: now,
        })
    }

    /// Deleting a markup only affects future pipeline runs; the stored
    /// tree is untouched.
    pub fn delete_markup(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM estimate_markups WHERE id = ?", [id.to_string()])?;
        if rows == 0 {
            return Err(EstimateError::not_found("markup", id));
        }
        Ok(())
    }

    // ============================================================
    // Estimate reads
    // ============================================================

    /// Load a project's flat rows and assemble the estimate forest.
    pub fn get_estimate_tree(&self, project_id: Uuid) -> Result<Vec<StageTreeNode>> {
        self.get_project(project_id)?
            .ok_or(EstimateError::not_found("project", project_id))?;

        let stages = self.list_stages(project_id)?;
        let tasks = self.list_tasks(project_id)?;
        let resources = self.list_resources(project_id)?;
        estimate::build_forest(stages, tasks, resources)
    }

    /// Roll the project up and apply its markup list.
    pub fn get_estimate_summary(&self, project_id: Uuid) -> Result<EstimateSummary> {
        let forest = self.get_estimate_tree(project_id)?;
        let markups = self.list_markups(project_id)?;
        let totals = estimate::forest_totals(&forest);
        Ok(estimate::apply_markups(totals, &markups))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

// ============================================================
// Row mapping
// ============================================================

fn project_from_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn stage_from_row(row: &rusqlite::Row) -> rusqlite::Result<Stage> {
    Ok(Stage {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        parent_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
        name: row.get(3)?,
        code: row.get(4)?,
        sort_order: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

fn task_from_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        stage_id: parse_uuid(row.get::<_, String>(2)?),
        parent_id: row.get::<_, Option<String>>(3)?.map(parse_uuid),
        name: row.get(4)?,
        code: row.get(5)?,
        volume: row.get(6)?,
        unit_id: row.get::<_, Option<String>>(7)?.map(parse_uuid),
        is_group: row.get::<_, i32>(8)? != 0,
        calc_mode: CalcMode::from_str(&row.get::<_, String>(9)?).unwrap_or(CalcMode::ByResources),
        sort_order: row.get(10)?,
        created_at: parse_datetime(row.get::<_, String>(11)?),
        updated_at: parse_datetime(row.get::<_, String>(12)?),
    })
}

fn resource_from_row(row: &rusqlite::Row) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        task_id: parse_uuid(row.get::<_, String>(2)?),
        name: row.get(3)?,
        code: row.get(4)?,
        resource_type: ResourceType::from_str(&row.get::<_, String>(5)?)
            .unwrap_or(ResourceType::Material),
        unit_id: row.get::<_, Option<String>>(6)?.map(parse_uuid),
        volume: row.get(7)?,
        price: row.get(8)?,
        markup: row.get(9)?,
        cost: row.get(10)?,
        price_with_markup: row.get(11)?,
        cost_with_markup: row.get(12)?,
        url: row.get(13)?,
        sort_order: row.get(14)?,
        created_at: parse_datetime(row.get::<_, String>(15)?),
        updated_at: parse_datetime(row.get::<_, String>(16)?),
    })
}

fn markup_from_row(row: &rusqlite::Row) -> rusqlite::Result<Markup> {
    Ok(Markup {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        value: row.get(3)?,
        kind: MarkupKind::from_str(&row.get::<_, String>(4)?).unwrap_or(MarkupKind::Percent),
        is_tax: row.get::<_, i32>(5)? != 0,
        sort_order: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

// ============================================================
// Validation and cascade helpers
// ============================================================

fn require_name(entity: &'static str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EstimateError::validation(format!(
            "{entity} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn require_non_negative(field: &'static str, value: f64) -> Result<f64> {
    if value < 0.0 {
        return Err(EstimateError::validation(format!(
            "{field} must not be negative"
        )));
    }
    Ok(value)
}

fn cascade_error(e: rusqlite::Error) -> EstimateError {
    EstimateError::Cascade(e.to_string())
}

/// Ids of `root` and every transitive child, following stored parent links.
/// Guards against already-corrupt cyclic data with a visited set.
fn collect_subtree(root: Uuid, links: &[(Uuid, Option<Uuid>)]) -> Vec<Uuid> {
    let mut by_parent: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (id, parent) in links {
        if let Some(parent) = parent {
            by_parent.entry(*parent).or_default().push(*id);
        }
    }

    let mut subtree = vec![root];
    let mut visited: HashSet<Uuid> = HashSet::from([root]);
    let mut queue = vec![root];
    while let Some(current) = queue.pop() {
        for &child in by_parent.get(&current).into_iter().flatten() {
            if visited.insert(child) {
                subtree.push(child);
                queue.push(child);
            }
        }
    }
    subtree
}

/// Walk up from `parent`; reaching `id` means the assignment would close a
/// loop.
fn ensure_parent_acyclic(
    entity: &'static str,
    id: Uuid,
    parent: Uuid,
    links: &HashMap<Uuid, Option<Uuid>>,
) -> Result<()> {
    let mut current = Some(parent);
    let mut seen: HashSet<Uuid> = HashSet::new();
    while let Some(ancestor) = current {
        if ancestor == id {
            return Err(EstimateError::validation(format!(
                "moving {entity} {id} under {parent} would create a cycle"
            )));
        }
        if !seen.insert(ancestor) {
            break;
        }
        current = links.get(&ancestor).copied().flatten();
    }
    Ok(())
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

//! CSV serialization of an estimate tree.
//!
//! One row per resource, in tree order. Semicolon-delimited with every
//! field double-quoted, UTF-8 with a leading byte-order mark so
//! spreadsheet tools pick the encoding up. Export-only; there is no
//! import path for this format.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{ResourceType, StageTreeNode, TaskTreeNode, UnitMeasure};

const HEADER: &str = "Stage;Task;Resource;Type;Unit;Quantity;Price;Markup%;Total";

/// Render a project's estimate forest as CSV.
pub fn estimate_to_csv(forest: &[StageTreeNode], units: &[UnitMeasure]) -> String {
    let unit_codes: HashMap<Uuid, &str> = units.iter().map(|u| (u.id, u.code.as_str())).collect();

    let mut out = String::from("\u{feff}");
    out.push_str(HEADER);
    out.push('\n');
    for stage in forest {
        write_stage(&mut out, stage, &unit_codes);
    }
    out
}

fn write_stage(out: &mut String, node: &StageTreeNode, units: &HashMap<Uuid, &str>) {
    for task in &node.tasks {
        write_task(out, &node.stage.name, task, units);
    }
    for child in &node.children {
        write_stage(out, child, units);
    }
}

fn write_task(out: &mut String, stage_name: &str, node: &TaskTreeNode, units: &HashMap<Uuid, &str>) {
    for resource in &node.resources {
        let unit = resource
            .unit_id
            .and_then(|id| units.get(&id).copied())
            .unwrap_or("");
        let fields = [
            quote(stage_name),
            quote(&node.task.name),
            quote(&resource.name),
            quote(type_label(resource.resource_type)),
            quote(unit),
            quote(&resource.volume.to_string()),
            quote(&resource.price.to_string()),
            quote(&resource.markup.to_string()),
            quote(&resource.cost_with_markup.to_string()),
        ];
        out.push_str(&fields.join(";"));
        out.push('\n');
    }
    for child in &node.children {
        write_task(out, stage_name, child, units);
    }
}

fn type_label(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Labor => "Labor",
        ResourceType::Material => "Material",
        ResourceType::Equipment => "Equipment",
        ResourceType::Overhead => "Overhead",
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

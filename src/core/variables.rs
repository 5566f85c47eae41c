// src/core/variables.rs

use crate::core::cmake_var::{CMakeVar, Value};
use crate::core::error::{ConfigureError, ConfigureResult};
use crate::models::{ExportedVariable, ExportedVariables};
use std::collections::BTreeMap;

/// One write to a build variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub var: CMakeVar,
    /// The canonical value. `None` when the value canonicalized to "no value".
    pub value: Option<Value>,
    /// Name of the package that wrote the variable.
    pub owner: String,
}

/// Write-once mapping from build variable name to its canonical value.
///
/// Values are canonicalized when they are written, so type errors surface at the
/// package that produced them. Writing a variable twice is a collision, except for
/// appends by the owning package to a list variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    vars: BTreeMap<&'static str, Assignment>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `var` on behalf of `owner`.
    pub fn set(&mut self, owner: &str, var: CMakeVar, value: &Value) -> ConfigureResult<()> {
        if let Some(existing) = self.vars.get(var.name) {
            return Err(ConfigureError::VariableCollision {
                name: var.name.to_string(),
                first: existing.owner.clone(),
                second: owner.to_string(),
            });
        }
        let canonical = var.canonicalize(value)?;
        log::debug!("{}: {} = {:?}", owner, var.name, canonical);
        self.vars.insert(
            var.name,
            Assignment {
                var,
                value: canonical,
                owner: owner.to_string(),
            },
        );
        Ok(())
    }

    /// Extends a list variable. Only the package that first wrote it may extend it.
    pub fn append(&mut self, owner: &str, var: CMakeVar, items: &[String]) -> ConfigureResult<()> {
        if !var.kind.is_list() {
            return Err(ConfigureError::TypeMismatch {
                var: var.name.to_string(),
                kind: var.kind,
                value: items.join(" "),
                reason: "only list variables can be appended to".to_string(),
            });
        }
        let Some(Value::List(new_items)) = var.canonicalize(&Value::List(items.to_vec()))? else {
            return Ok(());
        };

        let Some(existing) = self.vars.get_mut(var.name) else {
            return self.set(owner, var, &Value::List(new_items));
        };
        if existing.owner != owner {
            return Err(ConfigureError::VariableCollision {
                name: var.name.to_string(),
                first: existing.owner.clone(),
                second: owner.to_string(),
            });
        }
        let mut merged = existing
            .value
            .as_ref()
            .map(Value::to_list)
            .unwrap_or_default();
        merged.extend(new_items);
        log::debug!("{}: {} += {:?}", owner, var.name, merged);
        existing.value = Some(Value::List(merged));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Assignment> {
        self.vars.get(name)
    }

    /// The canonical value of `name`, if it was set to something.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|assignment| assignment.value.as_ref())
    }

    pub fn owner(&self, name: &str) -> Option<&str> {
        self.get(name).map(|assignment| assignment.owner.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Assignments sorted by variable name.
    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.vars.values()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variable name to rendered text, as used for template substitution.
    pub fn rendered(&self) -> ConfigureResult<BTreeMap<String, String>> {
        self.iter()
            .map(|assignment| {
                let text = match &assignment.value {
                    Some(value) => assignment.var.render(value)?,
                    None => String::new(),
                };
                Ok((assignment.var.name.to_string(), text))
            })
            .collect()
    }

    /// The exported-variables document persisted next to the rendered configuration.
    pub fn exported(&self) -> ConfigureResult<ExportedVariables> {
        let rendered = self.rendered()?;
        Ok(self
            .iter()
            .map(|assignment| {
                let name = assignment.var.name;
                let exported = ExportedVariable {
                    type_str: assignment.var.type_str(assignment.value.as_ref()).to_string(),
                    value: rendered.get(name).cloned().unwrap_or_default(),
                    owner: assignment.owner.clone(),
                };
                (name.to_string(), exported)
            })
            .collect())
    }

    /// Command-line definitions for every variable with a value, skipping `exclude`.
    pub fn command_line(&self, quote: bool, exclude: &[&str]) -> ConfigureResult<Vec<String>> {
        let mut commands = Vec::new();
        for assignment in self.iter() {
            if exclude.contains(&assignment.var.name) {
                continue;
            }
            if let Some(value) = &assignment.value
                && let Some(command) = assignment.var.to_command_line(value, quote)?
            {
                commands.push(command);
            }
        }
        Ok(commands)
    }
}

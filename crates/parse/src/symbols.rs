use anyhow::{anyhow, bail, Result};

use crate::types::{round_up, Type, TypeTable, MAX_OBJECT_SIZE, WORD_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    pub ty: Type,
    pub size: usize,
    /// `size` rounded up to a whole number of stack words.
    pub stack_size: usize,
    /// Byte offset from the frame pointer.
    pub offset: usize,
}

/// Locals of the function currently being parsed, parameters first.
///
/// Offsets are the running sum of the 4-aligned sizes of earlier entries,
/// so the first variable sits at `fp + 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locals {
    vars: Vec<LocalVariable>,
}

impl Locals {
    pub fn add(&mut self, name: &str, ty: Type, types: &TypeTable) -> Result<usize> {
        let size = types
            .size_of(&ty)
            .map_err(|e| anyhow!("cannot allocate local '{}': {}", name, e))?;
        let offset = self.frame_size();
        let stack_size = round_up(size, WORD_SIZE);
        if stack_size > MAX_OBJECT_SIZE - offset {
            bail!("cannot allocate local '{}': stack frame exceeds {} bytes", name, MAX_OBJECT_SIZE);
        }
        self.vars.push(LocalVariable {
            name: name.to_string(),
            ty,
            size,
            stack_size,
            offset,
        });
        Ok(offset)
    }

    /// Most recent declaration wins.
    pub fn find(&self, name: &str) -> Option<&LocalVariable> {
        self.vars.iter().rev().find(|v| v.name == name)
    }

    pub fn frame_size(&self) -> usize {
        self.vars.iter().map(|v| v.stack_size).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVariable> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize { self.vars.len() }
    pub fn is_empty(&self) -> bool { self.vars.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalInit {
    Int(i32),
    /// Entry `id` of the [`StringPool`]; `text` is kept for printing.
    Str { id: usize, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub init: Option<GlobalInit>,
}

#[derive(Debug, Clone, Default)]
pub struct Globals {
    vars: Vec<GlobalVariable>,
}

impl Globals {
    pub fn add(&mut self, var: GlobalVariable, types: &TypeTable) -> Result<()> {
        types
            .size_of(&var.ty)
            .map_err(|e| anyhow!("global '{}': {}", var.name, e))?;
        if self.find(&var.name).is_some() {
            bail!("redefinition of global '{}'", var.name);
        }
        self.vars.push(var);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&GlobalVariable> {
        self.vars.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantString {
    pub id: usize,
    /// Source text including the surrounding quotes, escapes untouched.
    pub text: String,
}

/// String literals in order of first appearance. Ids start at 1 and are
/// never reused; identical literals get distinct ids.
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    strings: Vec<ConstantString>,
}

impl StringPool {
    pub fn add(&mut self, text: &str) -> usize {
        let id = self.strings.len() + 1;
        self.strings.push(ConstantString {
            id,
            text: text.to_string(),
        });
        id
    }

    pub fn get(&self, id: usize) -> Option<&ConstantString> {
        id.checked_sub(1).and_then(|i| self.strings.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstantString> {
        self.strings.iter()
    }

    pub fn len(&self) -> usize { self.strings.len() }
    pub fn is_empty(&self) -> bool { self.strings.is_empty() }
}

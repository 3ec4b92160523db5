use super::analyzer::Dataflow;
use super::reachability::Reachability;
use super::state::StoreSite;
use super::types::VerificationType;
use super::Context;
use crate::jvm::{Code, Instruction, InvokeType, Op, TypeGraph};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Local variable, as opposed to a local variable slot
///
/// One slot may hold several unrelated local variables over the course of a method (eg. an `int`
/// loop counter, then later a `String`). Each load and store of the slot belongs to exactly one
/// of them, so they can be given distinct types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVar<C> {
    /// At least one load can see the value passed in as a parameter
    pub is_arg: bool,

    /// Slot of the variable
    pub local: u16,

    /// Type of every value stored into the variable
    pub ty: VerificationType<C>,

    /// Name from the `LocalVariableTable` (only looked up when emitting debug info)
    pub name: Option<String>,

    /// Range of `pc`s from the `LocalVariableTable` where the variable is in scope
    pub pc_range: Option<Range<usize>>,
}

/// Local variables of a method, indexed by instruction
pub(super) struct Locals<C> {
    /// Every distinct local variable
    pub local_vars: Vec<LocalVar<C>>,

    /// Local variable loaded or stored by each instruction (index into `local_vars`)
    pub by_instruction: Vec<Option<usize>>,

    /// For each `invokespecial`, the local variable initialized in each slot
    pub by_invokespecial: Vec<Option<Vec<Option<usize>>>>,
}

/// Group the loads and stores of local variable slots into local variables
pub(super) fn reconcile<G: TypeGraph>(
    ctx: &Context<G>,
    code: &Code,
    dataflow: &Dataflow<G::Class>,
    reachability: &Reachability,
) -> Locals<G::Class> {
    let mut builder = Builder {
        graph: ctx.graph,
        code,
        dataflow,
        debug: ctx.settings.emit_debug_info,
        vars: vec![],
        forward: vec![],
        by_store_site: BTreeMap::new(),
    };

    let mut load_vars = vec![None; code.instructions.len()];
    for (index, readers) in dataflow.readers.iter().enumerate() {
        if let Some(readers) = readers {
            load_vars[index] = builder.visit_load(index, readers);
        }
    }

    if builder.debug {
        builder.keep_dead_stores(&reachability.reachable);
        builder.merge_by_debug_info();
    } else {
        builder.merge_identical();
    }

    let locals = builder.finish(&load_vars);
    log::debug!(
        "{} local variables in {}",
        locals.local_vars.len(),
        ctx.qualified_name()
    );
    locals
}

struct Builder<'a, G: TypeGraph> {
    graph: &'a G,
    code: &'a Code,
    dataflow: &'a Dataflow<G::Class>,
    debug: bool,

    vars: Vec<LocalVar<G::Class>>,

    /// Variables merged into other variables point to them (others point to themselves)
    forward: Vec<usize>,

    /// Variable owning the value stored into a slot at a store site
    by_store_site: BTreeMap<(StoreSite, u16), usize>,
}

impl<'a, G: TypeGraph> Builder<'a, G> {
    fn find(&self, mut var: usize) -> usize {
        while self.forward[var] != var {
            var = self.forward[var];
        }
        var
    }

    fn new_var(
        &mut self,
        index: usize,
        local: u16,
        ty: VerificationType<G::Class>,
        is_arg: bool,
    ) -> usize {
        let mut var = LocalVar {
            is_arg,
            local,
            ty,
            name: None,
            pc_range: None,
        };
        if self.debug {
            self.find_debug_entry(index, &mut var);
        }
        self.vars.push(var);
        self.forward.push(self.forward.len());
        self.forward.len() - 1
    }

    /// Fold `other` into `keep`, as long as their types can be joined
    fn try_merge(&mut self, keep: usize, other: usize) -> bool {
        if keep == other {
            return true;
        }
        let joined = self.vars[keep].ty.join(&self.vars[other].ty, self.graph);
        if joined == VerificationType::Invalid {
            return false;
        }
        self.vars[keep].ty = joined;
        self.vars[keep].is_arg |= self.vars[other].is_arg;
        self.forward[other] = keep;
        true
    }

    /// Type of the value stored into a slot at a store site
    fn store_type(
        &self,
        site: StoreSite,
        local: u16,
    ) -> Option<VerificationType<G::Class>> {
        let states = &self.dataflow.states;
        match site {
            StoreSite::Parameter => states[0].as_ref()?.local(local as usize),
            StoreSite::Instruction(store) => match &self.code.instructions[store].op {
                // Never continues, so nothing gets stored
                Op::Deferred { .. } => None,

                // Constructor call, which initialized the slot
                Op::Resolved(Instruction::Invoke(InvokeType::Special, _))
                | Op::Resolved(Instruction::DynamicInvoke(InvokeType::Special, _)) => {
                    states.get(store + 1)?.as_ref()?.local(local as usize)
                }

                Op::Resolved(_) => states[store].as_ref()?.stack_slot(0),
            },
        }
    }

    /// Find (or create) the variable read by a load, given all the stores it may read from
    fn visit_load(&mut self, index: usize, readers: &BTreeSet<StoreSite>) -> Option<usize> {
        let local = self.code.instructions[index]
            .op
            .instruction()
            .loaded_local()?;

        let mut ty = VerificationType::Null;
        let mut is_arg = false;
        for site in readers {
            is_arg |= *site == StoreSite::Parameter;
            if let Some(site_type) = self.store_type(*site, local) {
                ty = ty.join(&site_type.nominal(), self.graph);
            }
        }
        let ty = ty.unwrap_this();

        // Variables already owning one of the stores
        let mut var = None;
        for site in readers {
            if let Some(existing) = self.by_store_site.get(&(*site, local)).copied() {
                let existing = self.find(existing);
                var = Some(match var {
                    None => existing,
                    Some(var) => {
                        self.try_merge(var, existing);
                        var
                    }
                });
            }
        }

        let var = match var {
            Some(var) => {
                let joined = self.vars[var].ty.join(&ty, self.graph);
                if joined == VerificationType::Invalid {
                    self.new_var(index, local, ty, is_arg)
                } else {
                    self.vars[var].ty = joined;
                    self.vars[var].is_arg |= is_arg;
                    var
                }
            }
            None => self.new_var(index, local, ty, is_arg),
        };

        for site in readers {
            match self.by_store_site.get(&(*site, local)).copied() {
                None => {
                    self.by_store_site.insert((*site, local), var);
                }
                Some(other) => {
                    let other = self.find(other);
                    self.try_merge(var, other);
                }
            }
        }
        Some(var)
    }

    /// Give stores nothing ever reads a variable too, so debuggers can show them
    fn keep_dead_stores(&mut self, reachable: &[bool]) {
        for index in 0..self.code.instructions.len() {
            let local = match self.code.instructions[index].op.instruction().stored_local() {
                Some(local) if reachable[index] => local,
                _ => continue,
            };
            let key = (StoreSite::Instruction(index), local);
            if self.by_store_site.contains_key(&key) {
                continue;
            }
            let ty = self
                .store_type(StoreSite::Instruction(index), local)
                .map_or(VerificationType::Invalid, |ty| ty.nominal().unwrap_this());
            let var = self.new_var(index, local, ty, false);
            self.by_store_site.insert(key, var);
        }
    }

    /// Look up the variable's name and scope in the `LocalVariableTable`
    ///
    /// A store right before the range starts counts, since `javac` starts ranges after the
    /// initializing store.
    fn find_debug_entry(&self, index: usize, var: &mut LocalVar<G::Class>) {
        let table = match &self.code.local_variable_table {
            Some(table) => table,
            None => return,
        };
        let instruction = &self.code.instructions[index];
        let pc = instruction.pc;
        let next_pc = self.code.next_pc(index);
        let is_store = instruction.op.instruction().stored_local().is_some();

        let entry = table.iter().find(|entry| {
            entry.index == var.local
                && (entry.start_pc <= pc || entry.start_pc == next_pc && is_store)
                && entry.start_pc + entry.length > pc
        });
        if let Some(entry) = entry {
            var.name = Some(entry.name.clone());
            var.pc_range = Some(entry.start_pc..entry.start_pc + entry.length);
        }
    }

    fn roots(&self) -> Vec<usize> {
        (0..self.vars.len())
            .filter(|var| self.find(*var) == *var)
            .collect()
    }

    /// Trust the `LocalVariableTable`: same name and same scope means same variable
    fn merge_by_debug_info(&mut self) {
        let roots = self.roots();
        for (i, var1) in roots.iter().enumerate() {
            for var2 in &roots[i + 1..] {
                if self.find(*var1) != *var1 || self.find(*var2) != *var2 {
                    continue;
                }
                let (v1, v2) = (&self.vars[*var1], &self.vars[*var2]);
                if v1.name.is_some() && v1.name == v2.name && v1.pc_range == v2.pc_range {
                    self.try_merge(*var1, *var2);
                }
            }
        }
    }

    /// Variables in the same slot with the same type might as well be the same variable
    fn merge_identical(&mut self) {
        let roots = self.roots();
        for (i, var1) in roots.iter().enumerate() {
            for var2 in &roots[i + 1..] {
                if self.find(*var1) != *var1 || self.find(*var2) != *var2 {
                    continue;
                }
                let (v1, v2) = (&self.vars[*var1], &self.vars[*var2]);
                if v1.local == v2.local && v1.ty == v2.ty {
                    self.try_merge(*var1, *var2);
                }
            }
        }
    }

    fn finish(self, load_vars: &[Option<usize>]) -> Locals<G::Class> {
        let roots = self.roots();
        let mut renumbered = vec![0; self.vars.len()];
        for (new_index, root) in roots.iter().enumerate() {
            renumbered[*root] = new_index;
        }
        let resolve = |var: usize| renumbered[self.find(var)];
        let lookup = |site: StoreSite, local: u16| {
            self.by_store_site.get(&(site, local)).map(|var| resolve(*var))
        };

        let len = self.code.instructions.len();
        let mut by_instruction = vec![None; len];
        let mut by_invokespecial = vec![None; len];
        for (index, instruction) in self.code.instructions.iter().enumerate() {
            if let Some(var) = load_vars[index] {
                by_instruction[index] = Some(resolve(var));
                continue;
            }
            match &instruction.op {
                Op::Resolved(Instruction::Invoke(InvokeType::Special, _))
                | Op::Resolved(Instruction::DynamicInvoke(InvokeType::Special, _)) => {
                    let site = StoreSite::Instruction(index);
                    by_invokespecial[index] = Some(
                        (0..self.code.max_locals)
                            .map(|local| lookup(site, local))
                            .collect(),
                    );
                }
                op => {
                    if let Some(local) = op.instruction().stored_local() {
                        by_instruction[index] = lookup(StoreSite::Instruction(index), local);
                    }
                }
            }
        }

        let local_vars = roots.iter().map(|root| self.vars[*root].clone()).collect();
        Locals {
            local_vars,
            by_instruction,
            by_invokespecial,
        }
    }
}

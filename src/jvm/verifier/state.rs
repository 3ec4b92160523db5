use super::types::VerificationType;
use crate::jvm::{RefType, TypeGraph, VerifyErrorKind};
use crate::util::{Offset, OffsetVec};
use std::collections::BTreeSet;

/// Where the value in a local variable came from
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreSite {
    /// Method parameter (including `this`)
    Parameter,

    /// Instruction (by index) which stored the value
    Instruction(usize),
}

/// Subroutine (entered with `jsr`) which is active in some state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subroutine {
    /// Index of the first instruction of the subroutine
    pub id: usize,

    /// Which locals have been written to since the subroutine was entered
    pub locals_modified: Vec<bool>,
}

/// Abstract state of the JVM right before an instruction executes
#[derive(Clone, Debug)]
pub struct InstructionState<C> {
    /// Operand stack, with offsets in terms of capacity units
    stack: OffsetVec<VerificationType<C>>,
    max_stack: usize,

    locals: Vec<VerificationType<C>>,
    store_sites: Vec<BTreeSet<StoreSite>>,

    /// Active subroutines, innermost last
    subroutines: Vec<Subroutine>,

    /// Number of `jsr` call sites which flowed into this state
    call_sites: usize,

    /// In a constructor, before the superclass (or other) constructor is called
    uninitialized_this: bool,

    /// Needs to be (re)processed
    pub changed: bool,
}

impl<C: Copy + Eq> InstructionState<C> {
    /// State with an empty stack and all locals invalid
    pub fn new(max_locals: usize, max_stack: usize) -> InstructionState<C> {
        InstructionState {
            stack: OffsetVec::new_starting_at(Offset(0)),
            max_stack,
            locals: vec![VerificationType::Invalid; max_locals],
            store_sites: vec![BTreeSet::new(); max_locals],
            subroutines: vec![],
            call_sites: 0,
            uninitialized_this: false,
            changed: true,
        }
    }

    /// Same locals and subroutines, but an empty stack (for entering an exception handler)
    pub fn with_empty_stack(&self) -> InstructionState<C> {
        InstructionState {
            stack: OffsetVec::new_starting_at(Offset(0)),
            max_stack: self.max_stack,
            locals: self.locals.clone(),
            store_sites: self.store_sites.clone(),
            subroutines: self.subroutines.clone(),
            call_sites: self.call_sites,
            uninitialized_this: self.uninitialized_this,
            changed: true,
        }
    }

    /// Number of values on the stack (where `long` and `double` count once)
    pub fn stack_height(&self) -> usize {
        self.stack.len()
    }

    /// Number of capacity units used on the stack (where `long` and `double` count twice)
    pub fn stack_units(&self) -> usize {
        self.stack.offset_len().0
    }

    /// Stack value at some depth from the top (`0` is the top)
    pub fn stack_slot(&self, depth: usize) -> Option<VerificationType<C>> {
        let index = self.stack.len().checked_sub(depth + 1)?;
        self.stack.get(index).copied()
    }

    pub fn stack_values(&self) -> impl Iterator<Item = &VerificationType<C>> {
        self.stack.iter().map(|(_, value)| value)
    }

    pub fn max_locals(&self) -> usize {
        self.locals.len()
    }

    /// Local variable type, without recording a read
    pub fn local(&self, index: usize) -> Option<VerificationType<C>> {
        self.locals.get(index).copied()
    }

    /// Where the current value of a local may have come from
    pub fn store_sites(&self, index: usize) -> Option<&BTreeSet<StoreSite>> {
        self.store_sites.get(index)
    }

    pub fn is_uninitialized_this(&self) -> bool {
        self.uninitialized_this
    }

    pub fn set_uninitialized_this(&mut self, uninitialized_this: bool) {
        self.uninitialized_this = uninitialized_this;
    }

    pub fn push(&mut self, value: VerificationType<C>) -> Result<(), VerifyErrorKind> {
        let units = self.stack_units() + if value.is_wide() { 2 } else { 1 };
        if units > self.max_stack {
            return Err(VerifyErrorKind::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn push_int(&mut self) -> Result<(), VerifyErrorKind> {
        self.push(VerificationType::Integer)
    }

    pub fn push_long(&mut self) -> Result<(), VerifyErrorKind> {
        self.push(VerificationType::Long)
    }

    /// Push a `float`, possibly tracking that it has extended precision
    pub fn push_float(&mut self, extended: bool) -> Result<(), VerifyErrorKind> {
        self.push(if extended {
            VerificationType::ExtendedFloat
        } else {
            VerificationType::Float
        })
    }

    /// Push a `double`, possibly tracking that it has extended precision
    pub fn push_double(&mut self, extended: bool) -> Result<(), VerifyErrorKind> {
        self.push(if extended {
            VerificationType::ExtendedDouble
        } else {
            VerificationType::Double
        })
    }

    pub fn peek(&self) -> Result<VerificationType<C>, VerifyErrorKind> {
        self.stack.last().copied().ok_or(VerifyErrorKind::EmptyStack)
    }

    /// Pop any value, forgetting whether it came from local 0
    pub fn pop_any(&mut self) -> Result<VerificationType<C>, VerifyErrorKind> {
        match self.stack.pop() {
            Some((_, value)) => Ok(value.unwrap_this()),
            None => Err(VerifyErrorKind::EmptyStack),
        }
    }

    pub fn pop_many(&mut self, count: usize) -> Result<(), VerifyErrorKind> {
        for _ in 0..count {
            self.pop_any()?;
        }
        Ok(())
    }

    /// Pop a value occupying a single slot
    pub fn pop(&mut self) -> Result<VerificationType<C>, VerifyErrorKind> {
        let value = self.pop_any()?;
        if value.is_wide() {
            return Err(VerifyErrorKind::SplitWideValue);
        }
        Ok(value)
    }

    pub fn pop_int(&mut self) -> Result<(), VerifyErrorKind> {
        match self.pop_any()? {
            VerificationType::Integer => Ok(()),
            _ => Err(VerifyErrorKind::ExpectedInt),
        }
    }

    pub fn pop_long(&mut self) -> Result<(), VerifyErrorKind> {
        match self.pop_any()? {
            VerificationType::Long => Ok(()),
            _ => Err(VerifyErrorKind::ExpectedLong),
        }
    }

    /// Pop a `float`, returning whether it was extended precision
    pub fn pop_float(&mut self) -> Result<bool, VerifyErrorKind> {
        match self.pop_any()? {
            VerificationType::Float => Ok(false),
            VerificationType::ExtendedFloat => Ok(true),
            _ => Err(VerifyErrorKind::ExpectedFloat),
        }
    }

    /// Pop a `double`, returning whether it was extended precision
    pub fn pop_double(&mut self) -> Result<bool, VerifyErrorKind> {
        match self.pop_any()? {
            VerificationType::Double => Ok(false),
            VerificationType::ExtendedDouble => Ok(true),
            _ => Err(VerifyErrorKind::ExpectedDouble),
        }
    }

    /// Pop an array (or `null`, or something unloadable)
    pub fn pop_array<G: TypeGraph<Class = C>>(
        &mut self,
        graph: &G,
    ) -> Result<VerificationType<C>, VerifyErrorKind> {
        let value = self.pop_any()?;
        if !value.is_null_or_unloadable(graph) && value.array_rank() == 0 {
            return Err(VerifyErrorKind::ExpectedArrayOnStack);
        }
        Ok(value)
    }

    /// Pop `null` or an initialized reference (or a return address)
    pub fn pop_object(&mut self) -> Result<VerificationType<C>, VerifyErrorKind> {
        let value = self.pop()?;
        if value.is_primitive() || value.is_new() || value == VerificationType::UninitializedThis
        {
            return Err(VerifyErrorKind::ExpectedObjectOnStack);
        }
        Ok(value)
    }

    /// Pop `null` or an initialized reference assignable to `expected`
    ///
    /// Any reference is accepted where an interface (or array of interfaces) is expected, since
    /// interface types are only checked when methods get invoked on them.
    pub fn pop_object_of<G: TypeGraph<Class = C>>(
        &mut self,
        expected: &RefType<C>,
        graph: &G,
    ) -> Result<VerificationType<C>, VerifyErrorKind> {
        let value = self.pop_object()?;
        let expected_type = VerificationType::Object(*expected);
        if expected_type.is_unloadable(graph)
            || expected_type.is_interface_or_interface_array(graph)
            || value.is_null_or_unloadable(graph)
            || value.is_assignable_to(expected, graph)
        {
            Ok(value)
        } else {
            Err(VerifyErrorKind::UnexpectedType {
                found: value.display(graph),
                expected: expected_type.display(graph),
            })
        }
    }

    /// Pop a value of the expected type (or something assignable to it)
    ///
    /// This also works for `long` and `double`, and accepts extended precision values where
    /// their nominal type is expected.
    pub fn pop_type<G: TypeGraph<Class = C>>(
        &mut self,
        expected: VerificationType<C>,
        graph: &G,
    ) -> Result<VerificationType<C>, VerifyErrorKind> {
        use VerificationType::*;

        let value = self.pop_any()?;
        if value.is_new() || value == UninitializedThis {
            return Err(VerifyErrorKind::ExpectedObjectOrArray);
        }

        let accepted = value == expected
            || value == Null && !expected.is_primitive()
            || value.is_unloadable(graph) && !expected.is_primitive()
            || expected.is_unloadable(graph) && !value.is_primitive()
            || expected
                .ref_type()
                .map_or(false, |ref_type| value.is_assignable_to(ref_type, graph))
            || expected.is_interface_or_interface_array(graph) && !value.is_primitive()
            || matches!((value, expected), (ExtendedFloat, Float) | (ExtendedDouble, Double));
        if accepted {
            Ok(value)
        } else {
            Err(VerifyErrorKind::UnexpectedType {
                found: value.display(graph),
                expected: expected.display(graph),
            })
        }
    }

    /// Write a value into locals, invalidating any wide value it partially overwrites
    fn set_local_slots(
        &mut self,
        index: usize,
        value: VerificationType<C>,
    ) -> Result<(), VerifyErrorKind> {
        let width = if value.is_wide() { 2 } else { 1 };
        if index + width > self.locals.len() {
            return Err(VerifyErrorKind::IllegalLocal);
        }

        if index > 0 && self.locals[index - 1].is_wide() {
            self.locals[index - 1] = VerificationType::Invalid;
            self.mark_modified(index - 1);
        }
        self.locals[index] = value;
        self.mark_modified(index);
        if width == 2 {
            self.locals[index + 1] = VerificationType::Invalid;
            self.mark_modified(index + 1);
        }
        Ok(())
    }

    fn mark_modified(&mut self, index: usize) {
        for subroutine in &mut self.subroutines {
            subroutine.locals_modified[index] = true;
        }
    }

    /// Store a value into a local, remembering where it was stored
    pub fn set_local(
        &mut self,
        index: usize,
        value: VerificationType<C>,
        site: StoreSite,
    ) -> Result<(), VerifyErrorKind> {
        self.set_local_slots(index, value)?;
        self.store_sites[index] = BTreeSet::from([site]);
        Ok(())
    }

    /// Read a local, recording its store sites as being read
    pub fn get_local(
        &self,
        index: usize,
        readers: &mut BTreeSet<StoreSite>,
    ) -> Result<VerificationType<C>, VerifyErrorKind> {
        let value = self.locals.get(index).ok_or(VerifyErrorKind::IllegalLocal)?;
        readers.extend(self.store_sites[index].iter().copied());
        Ok(*value)
    }

    pub fn get_local_int(
        &self,
        index: usize,
        readers: &mut BTreeSet<StoreSite>,
    ) -> Result<(), VerifyErrorKind> {
        match self.get_local(index, readers)? {
            VerificationType::Integer => Ok(()),
            _ => Err(VerifyErrorKind::InvalidLocalType),
        }
    }

    pub fn get_local_long(
        &self,
        index: usize,
        readers: &mut BTreeSet<StoreSite>,
    ) -> Result<(), VerifyErrorKind> {
        match self.get_local(index, readers)? {
            VerificationType::Long => Ok(()),
            _ => Err(VerifyErrorKind::LocalNotLong),
        }
    }

    pub fn get_local_float(
        &self,
        index: usize,
        readers: &mut BTreeSet<StoreSite>,
    ) -> Result<(), VerifyErrorKind> {
        match self.get_local(index, readers)? {
            VerificationType::Float => Ok(()),
            _ => Err(VerifyErrorKind::LocalNotFloat),
        }
    }

    pub fn get_local_double(
        &self,
        index: usize,
        readers: &mut BTreeSet<StoreSite>,
    ) -> Result<(), VerifyErrorKind> {
        match self.get_local(index, readers)? {
            VerificationType::Double => Ok(()),
            _ => Err(VerifyErrorKind::LocalNotDouble),
        }
    }

    /// Read a return address, returning the subroutine it returns from
    pub fn get_local_ret(
        &self,
        index: usize,
        readers: &mut BTreeSet<StoreSite>,
    ) -> Result<usize, VerifyErrorKind> {
        match self.get_local(index, readers)? {
            VerificationType::Ret(subroutine) => Ok(subroutine),
            _ => Err(VerifyErrorKind::LocalNotRet),
        }
    }

    /// Replace all occurrences of an uninitialized type once its constructor has been called
    pub fn mark_initialized(
        &mut self,
        uninitialized: VerificationType<C>,
        initialized: VerificationType<C>,
        site: usize,
    ) {
        for (local, sites) in self.locals.iter_mut().zip(self.store_sites.iter_mut()) {
            if *local == uninitialized {
                *local = initialized;
                *sites = BTreeSet::from([StoreSite::Instruction(site)]);
            }
        }

        let mut stack = OffsetVec::new_starting_at(Offset(0));
        for (_, value) in self.stack.iter() {
            stack.push(if *value == uninitialized {
                initialized
            } else {
                *value
            });
        }
        self.stack = stack;
    }

    pub fn check_uninitialized_this(&self) -> Result<(), VerifyErrorKind> {
        if self.uninitialized_this {
            Err(VerifyErrorKind::BaseConstructorNotCalled)
        } else {
            Ok(())
        }
    }

    /// Fail if an object allocated with `new` but not initialized is anywhere in the state
    pub fn check_uninitialized_objects(&self) -> Result<(), VerifyErrorKind> {
        if self.locals.iter().any(VerificationType::is_new) {
            return Err(VerifyErrorKind::UninitializedLocal);
        }
        if self.stack_values().any(VerificationType::is_new) {
            return Err(VerifyErrorKind::UninitializedStack);
        }
        Ok(())
    }

    /// Enter a subroutine
    pub fn enter_subroutine(&mut self, id: usize) -> Result<(), VerifyErrorKind> {
        if self.subroutines.iter().any(|subroutine| subroutine.id == id) {
            return Err(VerifyErrorKind::RecursiveSubroutine);
        }
        self.subroutines.push(Subroutine {
            id,
            locals_modified: vec![false; self.locals.len()],
        });
        Ok(())
    }

    /// Locals modified since entering an active subroutine
    pub fn locals_modified(&self, id: usize) -> Result<&[bool], VerifyErrorKind> {
        self.subroutines
            .iter()
            .find(|subroutine| subroutine.id == id)
            .map(|subroutine| subroutine.locals_modified.as_slice())
            .ok_or(VerifyErrorKind::WrongSubroutineReturn)
    }

    pub fn check_subroutine_active(&self, id: usize) -> Result<(), VerifyErrorKind> {
        if self.subroutines.iter().any(|subroutine| subroutine.id == id) {
            Ok(())
        } else {
            Err(VerifyErrorKind::InactiveSubroutine)
        }
    }

    pub fn add_call_site(&mut self) {
        self.call_sites += 1;
        self.changed = true;
    }

    /// Combine the state already known at a control flow join with an incoming one
    ///
    /// The `changed` flag of the result is only set if the result differs from `existing` (or
    /// if `existing` was already marked as changed).
    pub fn merge<G: TypeGraph<Class = C>>(
        existing: Option<&InstructionState<C>>,
        incoming: &InstructionState<C>,
        graph: &G,
    ) -> Result<InstructionState<C>, VerifyErrorKind> {
        let existing = match existing {
            None => {
                let mut merged = incoming.clone();
                merged.changed = true;
                return Ok(merged);
            }
            Some(existing) => existing,
        };

        if existing.stack.len() != incoming.stack.len()
            || existing.stack_units() != incoming.stack_units()
        {
            return Err(VerifyErrorKind::InconsistentStackHeight(
                existing.stack_units(),
                incoming.stack_units(),
            ));
        }

        let mut merged = existing.clone();

        // Stack slots must join, with the exception of two return addresses
        let mut stack = OffsetVec::new_starting_at(Offset(0));
        for ((_, t1), (_, t2)) in existing.stack.iter().zip(incoming.stack.iter()) {
            let joined = t1.join(t2, graph);
            let mergeable = if t1.is_primitive() {
                t2.is_primitive() && joined.nominal() == t1.nominal()
            } else {
                joined != VerificationType::Invalid
                    || matches!((t1, t2), (VerificationType::Ret(_), VerificationType::Ret(_)))
            };
            if !mergeable {
                return Err(VerifyErrorKind::CannotMerge(
                    t1.display(graph),
                    t2.display(graph),
                ));
            }
            merged.changed |= joined != *t1;
            stack.push(joined);
        }
        merged.stack = stack;

        // Locals which cannot be joined just become unusable
        for index in 0..merged.locals.len() {
            let joined = merged.locals[index].join(&incoming.locals[index], graph);
            if joined != merged.locals[index] {
                merged.locals[index] = joined;
                merged.changed = true;
            }

            let sites = &mut merged.store_sites[index];
            let before = sites.len();
            sites.extend(incoming.store_sites[index].iter().copied());
            merged.changed |= sites.len() != before;
        }

        if !merged.uninitialized_this && incoming.uninitialized_this {
            merged.uninitialized_this = true;
            merged.changed = true;
        }

        merged.merge_subroutines(incoming);
        Ok(merged)
    }

    /// Keep only the subroutines active on both sides, combining their modified locals
    fn merge_subroutines(&mut self, incoming: &InstructionState<C>) {
        let previous = std::mem::take(&mut self.subroutines);
        let previous_len = previous.len();
        for other in &incoming.subroutines {
            if let Some(subroutine) = previous.iter().find(|sub| sub.id == other.id) {
                let mut subroutine = subroutine.clone();
                for (modified, other_modified) in subroutine
                    .locals_modified
                    .iter_mut()
                    .zip(other.locals_modified.iter())
                {
                    if *other_modified && !*modified {
                        *modified = true;
                        self.changed = true;
                    }
                }
                self.subroutines.push(subroutine);
            }
        }
        if self.subroutines.len() != previous_len {
            self.changed = true;
        }

        if incoming.call_sites > self.call_sites {
            self.call_sites = incoming.call_sites;
            self.changed = true;
        }
    }

    /// State after returning from a subroutine, merged into the state following the `jsr`
    ///
    /// Locals the subroutine did not touch keep the value they had at the `jsr`. The active
    /// subroutines and call site count also come from the `jsr`.
    pub fn merge_subroutine_return<G: TypeGraph<Class = C>>(
        jsr_successor: Option<&InstructionState<C>>,
        jsr: &InstructionState<C>,
        ret: &InstructionState<C>,
        locals_modified: &[bool],
        graph: &G,
    ) -> Result<InstructionState<C>, VerifyErrorKind> {
        let mut next = ret.clone();
        for (index, modified) in locals_modified.iter().enumerate() {
            if !*modified {
                next.locals[index] = jsr.locals[index];
                next.store_sites[index] = jsr.store_sites[index].clone();
            }
        }
        next.subroutines = jsr.subroutines.clone();
        next.call_sites = jsr.call_sites;
        InstructionState::merge(jsr_successor, &next, graph)
    }
}

#[cfg(test)]
mod test {
    use super::VerificationType as VT;
    use super::*;
    use crate::jvm::class_graph::{ClassData, ClassGraph, ClassGraphArenas};
    use crate::jvm::{BinaryName, ClassAccessFlags, Name};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    #[test]
    fn wide_values_take_two_units() {
        let mut state: InstructionState<()> = InstructionState::new(0, 3);
        state.push_long().unwrap();
        state.push_int().unwrap();
        assert_eq!(state.stack_height(), 2);
        assert_eq!(state.stack_units(), 3);
        assert_eq!(state.push_int(), Err(VerifyErrorKind::StackOverflow));

        state.pop_int().unwrap();
        assert_eq!(state.push_double(true), Err(VerifyErrorKind::StackOverflow));
        assert_eq!(state.pop(), Err(VerifyErrorKind::SplitWideValue));
        assert_eq!(state.pop_any(), Err(VerifyErrorKind::EmptyStack));
    }

    #[test]
    fn extended_values_pop_as_nominal() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let mut state = InstructionState::new(0, 4);

        state.push_double(true).unwrap();
        assert_eq!(state.stack_slot(0), Some(VT::ExtendedDouble));
        assert_eq!(state.pop_type(VT::Double, &graph), Ok(VT::ExtendedDouble));

        state.push_float(true).unwrap();
        assert_eq!(state.pop_float(), Ok(true));

        state.push_int().unwrap();
        assert_eq!(
            state.pop_type(VT::Float, &graph),
            Err(VerifyErrorKind::UnexpectedType {
                found: String::from("int"),
                expected: String::from("float"),
            })
        );
    }

    #[test]
    fn pop_references() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let java = &graph.java;
        let string = RefType::Object(java.string);
        let mut state = InstructionState::new(0, 4);

        state.push(VT::This(java.string)).unwrap();
        assert_eq!(state.pop_object_of(&string, &graph), Ok(VT::object(java.string)));

        state.push(VT::object(java.integer)).unwrap();
        assert_eq!(
            state.pop_object_of(&RefType::Object(java.comparable), &graph),
            Ok(VT::object(java.integer))
        );

        state.push(VT::object(java.integer)).unwrap();
        assert!(matches!(
            state.pop_object_of(&string, &graph),
            Err(VerifyErrorKind::UnexpectedType { .. })
        ));

        state.push(VT::Null).unwrap();
        assert_eq!(state.pop_type(VT::Object(string), &graph), Ok(VT::Null));

        state.push(VT::UninitializedThis).unwrap();
        assert_eq!(state.pop_object(), Err(VerifyErrorKind::ExpectedObjectOnStack));

        state.push(VT::object(java.string)).unwrap();
        assert_eq!(state.pop_array(&graph), Err(VerifyErrorKind::ExpectedArrayOnStack));
    }

    #[test]
    fn locals_track_wide_values_and_store_sites() {
        let mut state: InstructionState<()> = InstructionState::new(3, 0);
        let mut readers = BTreeSet::new();

        state.set_local(0, VT::Long, StoreSite::Instruction(1)).unwrap();
        assert_eq!(state.local(1), Some(VT::Invalid));
        state.get_local_long(0, &mut readers).unwrap();
        assert_eq!(readers, BTreeSet::from([StoreSite::Instruction(1)]));

        // Overwriting the second half of a long kills the long
        state.set_local(1, VT::Integer, StoreSite::Instruction(2)).unwrap();
        assert_eq!(state.local(0), Some(VT::Invalid));
        assert_eq!(
            state.get_local_long(0, &mut readers),
            Err(VerifyErrorKind::LocalNotLong)
        );

        assert_eq!(
            state.set_local(2, VT::Double, StoreSite::Parameter),
            Err(VerifyErrorKind::IllegalLocal)
        );
        assert_eq!(state.get_local(3, &mut readers), Err(VerifyErrorKind::IllegalLocal));
    }

    #[test]
    fn merging_joins_types_and_unions_store_sites() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let java = &graph.java;
        let animal = graph.add_class(ClassData::new(
            name("zoo/Animal"),
            java.object,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        let dog = graph.add_class(ClassData::new(
            name("zoo/Dog"),
            animal,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        let cat = graph.add_class(ClassData::new(
            name("zoo/Cat"),
            animal,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));

        let mut s1 = InstructionState::new(2, 2);
        s1.set_local(0, VT::object(dog), StoreSite::Instruction(1)).unwrap();
        s1.set_local(1, VT::Integer, StoreSite::Instruction(1)).unwrap();
        s1.push_float(false).unwrap();
        s1.changed = false;

        let mut s2 = InstructionState::new(2, 2);
        s2.set_local(0, VT::object(cat), StoreSite::Instruction(2)).unwrap();
        s2.set_local(1, VT::Float, StoreSite::Instruction(2)).unwrap();
        s2.push_float(true).unwrap();

        let merged = InstructionState::merge(Some(&s1), &s2, &graph).unwrap();
        assert!(merged.changed);
        assert_eq!(merged.local(0), Some(VT::object(animal)));
        assert_eq!(merged.local(1), Some(VT::Invalid));
        assert_eq!(merged.stack_slot(0), Some(VT::ExtendedFloat));
        assert_eq!(
            merged.store_sites(0),
            Some(&BTreeSet::from([StoreSite::Instruction(1), StoreSite::Instruction(2)]))
        );

        let mut again = InstructionState::merge(Some(&merged), &s1, &graph).unwrap();
        again.changed = false;
        let settled = InstructionState::merge(Some(&again), &s2, &graph).unwrap();
        assert!(!settled.changed, "merging twice should be stable");
    }

    #[test]
    fn merging_rejects_mismatched_stacks() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);

        let mut s1 = InstructionState::new(0, 2);
        s1.push_int().unwrap();
        let mut s2 = InstructionState::new(0, 2);
        s2.push_long().unwrap();
        assert_eq!(
            InstructionState::merge(Some(&s1), &s2, &graph).err(),
            Some(VerifyErrorKind::InconsistentStackHeight(1, 2))
        );

        let mut s3 = InstructionState::new(0, 2);
        s3.push_float(false).unwrap();
        assert_eq!(
            InstructionState::merge(Some(&s1), &s3, &graph).err(),
            Some(VerifyErrorKind::CannotMerge(String::from("int"), String::from("float")))
        );

        let mut r1 = InstructionState::new(0, 1);
        r1.push(VT::Ret(3)).unwrap();
        let mut r2 = InstructionState::new(0, 1);
        r2.push(VT::Ret(7)).unwrap();
        let merged = InstructionState::merge(Some(&r1), &r2, &graph).unwrap();
        assert_eq!(merged.stack_slot(0), Some(VT::Invalid));
    }

    #[test]
    fn subroutines() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);

        let mut jsr = InstructionState::new(2, 1);
        jsr.set_local(0, VT::Integer, StoreSite::Instruction(0)).unwrap();
        jsr.set_local(1, VT::Integer, StoreSite::Instruction(0)).unwrap();

        let mut body = jsr.clone();
        body.enter_subroutine(5).unwrap();
        assert_eq!(body.enter_subroutine(5), Err(VerifyErrorKind::RecursiveSubroutine));
        body.set_local(1, VT::Float, StoreSite::Instruction(6)).unwrap();
        assert_eq!(body.locals_modified(5), Ok(&[false, true][..]));
        assert_eq!(body.check_subroutine_active(5), Ok(()));
        assert_eq!(jsr.check_subroutine_active(5), Err(VerifyErrorKind::InactiveSubroutine));
        assert_eq!(jsr.locals_modified(5), Err(VerifyErrorKind::WrongSubroutineReturn));

        let modified = body.locals_modified(5).unwrap().to_vec();
        let after = InstructionState::merge_subroutine_return(None, &jsr, &body, &modified, &graph)
            .unwrap();
        assert_eq!(after.local(0), Some(VT::Integer));
        assert_eq!(after.local(1), Some(VT::Float));
        assert_eq!(
            after.check_subroutine_active(5),
            Err(VerifyErrorKind::InactiveSubroutine)
        );
    }

    #[test]
    fn initialization() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let string = graph.java.string;
        let fresh = VT::New {
            class: string,
            pc: 0,
        };

        let mut state = InstructionState::new(1, 2);
        state.set_local(0, fresh, StoreSite::Instruction(1)).unwrap();
        state.push(fresh).unwrap();
        assert_eq!(
            state.check_uninitialized_objects(),
            Err(VerifyErrorKind::UninitializedLocal)
        );

        state.mark_initialized(fresh, VT::object(string), 4);
        assert_eq!(state.check_uninitialized_objects(), Ok(()));
        assert_eq!(state.local(0), Some(VT::object(string)));
        assert_eq!(state.stack_slot(0), Some(VT::object(string)));
        assert_eq!(
            state.store_sites(0),
            Some(&BTreeSet::from([StoreSite::Instruction(4)]))
        );

        state.set_uninitialized_this(true);
        assert_eq!(
            state.check_uninitialized_this(),
            Err(VerifyErrorKind::BaseConstructorNotCalled)
        );
    }
}

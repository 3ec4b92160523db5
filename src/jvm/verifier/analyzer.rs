use super::state::{InstructionState, StoreSite};
use super::types::{widen, VerificationType};
use super::Context;
use crate::jvm::{
    BaseType, Code, Constant, CoreClass, Error, FieldType, Instruction, InvokeType, RefType,
    TypeGraph, UnqualifiedName, VerifyErrorKind,
};
use crate::util::Width;
use std::collections::BTreeSet;

type VType<C> = VerificationType<C>;

/// Converged result of type inference
pub(super) struct Dataflow<C> {
    /// State before each instruction (`None` if control never gets there)
    pub states: Vec<Option<InstructionState<C>>>,

    /// For each instruction loading a local, the stores whose value it may load
    pub readers: Vec<Option<BTreeSet<StoreSite>>>,

    /// For each subroutine (by the index of its first instruction), the `jsr`s calling it
    pub call_sites: Vec<Vec<usize>>,
}

/// Resolve a relative branch offset into the index of the target instruction
pub(super) fn branch_target(code: &Code, index: usize, offset: i32) -> Result<usize, VerifyErrorKind> {
    let pc = code.instructions[index].pc as i64 + offset as i64;
    let target = usize::try_from(pc)
        .ok()
        .and_then(|pc| code.index_of(pc))
        .ok_or(VerifyErrorKind::IllegalBranchTarget)?;
    if target == code.instructions.len() {
        return Err(VerifyErrorKind::FallingOffEnd);
    }
    Ok(target)
}

/// Run type inference to a fixed point
pub(super) fn analyze<G: TypeGraph>(
    ctx: &Context<G>,
    code: &Code,
) -> Result<Dataflow<G::Class>, Error> {
    let first = match code.instructions.first() {
        Some(first) => first,
        None => return Err(ctx.error(VerifyErrorKind::FallingOffEnd, 0, &Instruction::Nop)),
    };
    let initial = initial_state(ctx, code)
        .map_err(|kind| ctx.error(kind, first.pc, first.op.instruction()))?;

    let len = code.instructions.len();
    let mut analyzer = Analyzer {
        ctx,
        code,
        dataflow: Dataflow {
            states: vec![None; len],
            readers: vec![None; len],
            call_sites: vec![vec![]; len],
        },
        return_sites: vec![vec![]; len],
    };
    analyzer.dataflow.states[0] = Some(initial);
    analyzer.run()?;
    Ok(analyzer.dataflow)
}

/// State on entry to the method: `this` and the parameters in the first locals
fn initial_state<G: TypeGraph>(
    ctx: &Context<G>,
    code: &Code,
) -> Result<InstructionState<G::Class>, VerifyErrorKind> {
    let mut state = InstructionState::new(code.max_locals as usize, code.max_stack as usize);
    let mut local = 0;

    if !ctx.is_static() {
        if ctx.is_constructor() {
            state.set_local(0, VType::UninitializedThis, StoreSite::Parameter)?;
            state.set_uninitialized_this(true);
        } else {
            state.set_local(0, VType::This(ctx.this_class()), StoreSite::Parameter)?;
        }
        local += 1;
    }

    for parameter in &ctx.descriptor.parameters {
        let parameter_type = VType::from(*parameter);
        state.set_local(local, parameter_type, StoreSite::Parameter)?;
        local += parameter_type.width();
    }
    Ok(state)
}

struct Analyzer<'a, 'c, G: TypeGraph> {
    ctx: &'a Context<'c, G>,
    code: &'a Code,
    dataflow: Dataflow<G::Class>,

    /// For each `jsr`, the `ret`s known to return from the subroutine it calls
    return_sites: Vec<Vec<usize>>,
}

impl<'a, 'c, G: TypeGraph> Analyzer<'a, 'c, G> {
    fn run(&mut self) -> Result<(), Error> {
        let code = self.code;
        let mut iterations = 0;
        loop {
            iterations += 1;
            let mut done = true;

            for (index, instruction) in code.instructions.iter().enumerate() {
                let changed = self.dataflow.states[index]
                    .as_ref()
                    .map_or(false, |state| state.changed);
                if changed {
                    done = false;
                    let op = instruction.op.instruction();
                    self.step(index)
                        .map_err(|kind| self.ctx.error(kind, instruction.pc, op))?;
                }
            }

            if done {
                break;
            }
        }

        log::debug!(
            "Type inference of {} converged after {} iterations",
            self.ctx.qualified_name(),
            iterations
        );
        Ok(())
    }

    /// Process an instruction whose state changed, propagating its effects to its successors
    fn step(&mut self, index: usize) -> Result<(), VerifyErrorKind> {
        let code = self.code;
        let current = match self.dataflow.states[index].as_mut() {
            Some(state) => {
                state.changed = false;
                state.clone()
            }
            None => return Ok(()),
        };
        let pc = code.instructions[index].pc;
        let instruction = code.instructions[index].op.instruction();
        log::trace!("{}: {:?}", pc, instruction);

        // Exception handlers get the locals, but a stack with only the exception
        for handler in &code.exception_table {
            if handler.start_pc <= pc && pc < handler.end_pc {
                let caught = if handler.catch_type == 0 {
                    RefType::Object(self.ctx.graph.core_class(CoreClass::Throwable))
                } else {
                    *self.ctx.class.constants.class(handler.catch_type)?
                };
                let mut entry = current.with_empty_stack();
                entry.push(VType::Object(caught))?;
                let target = code
                    .index_of(handler.handler_pc)
                    .ok_or(VerifyErrorKind::IllegalBranchTarget)?;
                self.merge_into(target, &entry)?;
            }
        }

        let mut next = current.clone();
        self.execute(index, instruction, &mut next)?;
        if next.stack_height() > code.max_stack as usize {
            return Err(VerifyErrorKind::StackSizeTooLarge);
        }
        self.propagate(index, instruction, &current, next)
    }

    fn merge_into(
        &mut self,
        target: usize,
        incoming: &InstructionState<G::Class>,
    ) -> Result<(), VerifyErrorKind> {
        let merged = InstructionState::merge(
            self.dataflow.states[target].as_ref(),
            incoming,
            self.ctx.graph,
        )?;
        self.dataflow.states[target] = Some(merged);
        Ok(())
    }

    /// Merge the state after an instruction into the states of its successors
    fn propagate(
        &mut self,
        index: usize,
        instruction: &Instruction,
        before: &InstructionState<G::Class>,
        mut after: InstructionState<G::Class>,
    ) -> Result<(), VerifyErrorKind> {
        let code = self.code;
        let graph = self.ctx.graph;

        match instruction {
            Instruction::Jsr(offset) => {
                let target = branch_target(code, index, *offset)?;
                after.enter_subroutine(target)?;
                after.push(VType::Ret(target))?;
                self.merge_into(target, &after)?;

                let successor = index + 1;
                for ret in self.return_sites[index].clone() {
                    let ret_state = match self.dataflow.states[ret].as_ref() {
                        Some(state) => state,
                        None => continue,
                    };
                    let locals_modified = ret_state.locals_modified(target)?;
                    let merged = InstructionState::merge_subroutine_return(
                        self.dataflow.states.get(successor).and_then(Option::as_ref),
                        before,
                        ret_state,
                        locals_modified,
                        graph,
                    )?;
                    self.set_successor_state(successor, merged)?;
                }

                if !self.dataflow.call_sites[target].contains(&index) {
                    self.dataflow.call_sites[target].push(index);
                    if let Some(entry) = self.dataflow.states[target].as_mut() {
                        entry.add_call_site();
                    }
                }
            }

            Instruction::Ret(local) => {
                let mut readers = BTreeSet::new();
                let subroutine = after.get_local_ret(*local as usize, &mut readers)?;
                let locals_modified = after.locals_modified(subroutine)?.to_vec();
                for call_site in self.dataflow.call_sites[subroutine].clone() {
                    if !self.return_sites[call_site].contains(&index) {
                        self.return_sites[call_site].push(index);
                        if let Some(call_state) = self.dataflow.states[call_site].as_mut() {
                            call_state.changed = true;
                        }
                    }

                    let successor = call_site + 1;
                    let jsr_state = match self.dataflow.states[call_site].as_ref() {
                        Some(state) => state,
                        None => continue,
                    };
                    let merged = InstructionState::merge_subroutine_return(
                        self.dataflow.states.get(successor).and_then(Option::as_ref),
                        jsr_state,
                        &after,
                        &locals_modified,
                        graph,
                    )?;
                    self.set_successor_state(successor, merged)?;
                }
            }

            Instruction::IReturn
            | Instruction::LReturn
            | Instruction::FReturn
            | Instruction::DReturn
            | Instruction::AReturn
            | Instruction::Return
            | Instruction::AThrow => (),

            _ => {
                for offset in instruction.branch_offsets() {
                    let target = branch_target(code, index, offset)?;
                    self.merge_into(target, &after)?;
                }
                if instruction.falls_through() {
                    if index + 1 >= code.instructions.len() {
                        return Err(VerifyErrorKind::FallingOffEnd);
                    }
                    self.merge_into(index + 1, &after)?;
                }
            }
        }
        Ok(())
    }

    /// Store the state following a `jsr`, which only exists if the `jsr` isn't last
    fn set_successor_state(
        &mut self,
        successor: usize,
        state: InstructionState<G::Class>,
    ) -> Result<(), VerifyErrorKind> {
        match self.dataflow.states.get_mut(successor) {
            Some(slot) => {
                *slot = Some(state);
                Ok(())
            }
            None => Err(VerifyErrorKind::FallingOffEnd),
        }
    }

    /// Simulate the effect of an instruction on the state
    fn execute(
        &mut self,
        index: usize,
        instruction: &Instruction,
        state: &mut InstructionState<G::Class>,
    ) -> Result<(), VerifyErrorKind> {
        use Instruction::*;

        let ctx = self.ctx;
        let graph = ctx.graph;
        let constants = &ctx.class.constants;
        let extended = ctx.settings.extended_precision;
        let store_site = StoreSite::Instruction(index);

        match instruction {
            Nop | Goto(_) | Jsr(_) => (),
            AConstNull => state.push(VType::Null)?,
            IConst(_) => state.push_int()?,
            LConst(_) => state.push_long()?,
            FConst(_) => state.push_float(false)?,
            DConst(_) => state.push_double(false)?,
            Ldc(idx) => {
                let value = match constants.get(*idx)? {
                    Constant::Integer(_) => VType::Integer,
                    Constant::Float(_) => VType::Float,
                    Constant::String(_) => VType::object(graph.core_class(CoreClass::String)),
                    Constant::Class(_) if ctx.class.major_version >= 49 => {
                        VType::object(graph.core_class(CoreClass::Class))
                    }
                    Constant::Class(_) | Constant::Long(_) | Constant::Double(_) => {
                        return Err(VerifyErrorKind::IllegalConstantType)
                    }
                    _ => return Err(VerifyErrorKind::IllegalConstantPoolIndex),
                };
                state.push(value)?;
            }
            Ldc2(idx) => match constants.get(*idx)? {
                Constant::Long(_) => state.push_long()?,
                Constant::Double(_) => state.push_double(false)?,
                Constant::Integer(_)
                | Constant::Float(_)
                | Constant::String(_)
                | Constant::Class(_) => return Err(VerifyErrorKind::IllegalConstantType),
                _ => return Err(VerifyErrorKind::IllegalConstantPoolIndex),
            },

            ILoad(idx) => {
                state.get_local_int(*idx as usize, self.readers(index))?;
                state.push_int()?;
            }
            LLoad(idx) => {
                state.get_local_long(*idx as usize, self.readers(index))?;
                state.push_long()?;
            }
            FLoad(idx) => {
                state.get_local_float(*idx as usize, self.readers(index))?;
                state.push_float(false)?;
            }
            DLoad(idx) => {
                state.get_local_double(*idx as usize, self.readers(index))?;
                state.push_double(false)?;
            }
            ALoad(idx) => {
                let value = state.get_local(*idx as usize, self.readers(index))?;
                if value == VType::Invalid || value.is_primitive() {
                    return Err(VerifyErrorKind::ExpectedObjectReference);
                }
                state.push(value)?;
            }
            IInc(idx, _) => state.get_local_int(*idx as usize, self.readers(index))?,

            IStore(idx) => {
                state.pop_int()?;
                state.set_local(*idx as usize, VType::Integer, store_site)?;
            }
            LStore(idx) => {
                state.pop_long()?;
                state.set_local(*idx as usize, VType::Long, store_site)?;
            }
            FStore(idx) | FStoreConv(idx) => {
                state.pop_float()?;
                state.set_local(*idx as usize, VType::Float, store_site)?;
            }
            DStore(idx) | DStoreConv(idx) => {
                state.pop_double()?;
                state.set_local(*idx as usize, VType::Double, store_site)?;
            }
            AStore(idx) => {
                // May be an uninitialized object or a return address
                let value = state.pop()?;
                if value.is_primitive() {
                    return Err(VerifyErrorKind::ExpectedObjectReference);
                }
                state.set_local(*idx as usize, value, store_site)?;
            }

            IALoad => array_load(state, BaseType::Int, graph)?,
            LALoad => array_load(state, BaseType::Long, graph)?,
            FALoad => array_load(state, BaseType::Float, graph)?,
            DALoad => array_load(state, BaseType::Double, graph)?,
            CALoad => array_load(state, BaseType::Char, graph)?,
            SALoad => array_load(state, BaseType::Short, graph)?,
            BALoad => {
                state.pop_int()?;
                let array = state.pop_array(graph)?;
                check_byte_or_boolean_array(&array, graph)?;
                state.push_int()?;
            }
            AALoad => {
                state.pop_int()?;
                let array = state.pop_array(graph)?;
                let element = match array {
                    VType::Null => VType::Null,
                    _ if array.is_unloadable(graph) => VType::Unloadable,
                    _ => match array.ref_type().and_then(RefType::component_type) {
                        Some(FieldType::Ref(component)) => VType::Object(component),
                        _ => return Err(VerifyErrorKind::ExpectedObjectArray),
                    },
                };
                state.push(element)?;
            }

            IAStore => {
                state.pop_int()?;
                array_store(state, BaseType::Int, graph)?;
            }
            LAStore => {
                state.pop_long()?;
                array_store(state, BaseType::Long, graph)?;
            }
            FAStore | FAStoreConv => {
                state.pop_float()?;
                array_store(state, BaseType::Float, graph)?;
            }
            DAStore | DAStoreConv => {
                state.pop_double()?;
                array_store(state, BaseType::Double, graph)?;
            }
            CAStore => {
                state.pop_int()?;
                array_store(state, BaseType::Char, graph)?;
            }
            SAStore => {
                state.pop_int()?;
                array_store(state, BaseType::Short, graph)?;
            }
            BAStore => {
                state.pop_int()?;
                state.pop_int()?;
                let array = state.pop_array(graph)?;
                check_byte_or_boolean_array(&array, graph)?;
            }
            AAStore => {
                state.pop_object()?;
                state.pop_int()?;
                state.pop_array(graph)?;
            }

            Pop => {
                state.pop()?;
            }
            Pop2 => {
                if !state.pop_any()?.is_wide() {
                    state.pop()?;
                }
            }
            Dup => {
                let value = state.pop()?;
                state.push(value)?;
                state.push(value)?;
            }
            DupX1 => {
                let value1 = state.pop()?;
                let value2 = state.pop()?;
                push_all(state, &[value1, value2, value1])?;
            }
            DupX2 => {
                let value1 = state.pop()?;
                let value2 = state.pop_any()?;
                if value2.is_wide() {
                    push_all(state, &[value1, value2, value1])?;
                } else {
                    let value3 = state.pop()?;
                    push_all(state, &[value1, value3, value2, value1])?;
                }
            }
            Dup2 => {
                let value1 = state.pop_any()?;
                if value1.is_wide() {
                    push_all(state, &[value1, value1])?;
                } else {
                    let value2 = state.pop()?;
                    push_all(state, &[value2, value1, value2, value1])?;
                }
            }
            Dup2X1 => {
                let value1 = state.pop_any()?;
                if value1.is_wide() {
                    let value2 = state.pop()?;
                    push_all(state, &[value1, value2, value1])?;
                } else {
                    let value2 = state.pop()?;
                    let value3 = state.pop()?;
                    push_all(state, &[value2, value1, value3, value2, value1])?;
                }
            }
            Dup2X2 => {
                let value1 = state.pop_any()?;
                if value1.is_wide() {
                    let value2 = state.pop_any()?;
                    if value2.is_wide() {
                        push_all(state, &[value1, value2, value1])?;
                    } else {
                        let value3 = state.pop()?;
                        push_all(state, &[value1, value3, value2, value1])?;
                    }
                } else {
                    let value2 = state.pop()?;
                    let value3 = state.pop_any()?;
                    if value3.is_wide() {
                        push_all(state, &[value2, value1, value3, value2, value1])?;
                    } else {
                        let value4 = state.pop()?;
                        push_all(state, &[value2, value1, value4, value3, value2, value1])?;
                    }
                }
            }
            Swap => {
                let value1 = state.pop()?;
                let value2 = state.pop()?;
                push_all(state, &[value1, value2])?;
            }

            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => {
                state.pop_int()?;
                state.pop_int()?;
                state.push_int()?;
            }
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
                state.pop_long()?;
                state.pop_long()?;
                state.push_long()?;
            }
            LSh(_) => {
                state.pop_int()?;
                state.pop_long()?;
                state.push_long()?;
            }
            FAdd | FSub | FMul | FDiv | FRem => {
                state.pop_float()?;
                state.pop_float()?;
                state.push_float(extended)?;
            }
            DAdd | DSub | DMul | DDiv | DRem => {
                state.pop_double()?;
                state.pop_double()?;
                state.push_double(extended)?;
            }
            INeg | I2B | I2C | I2S => {
                state.pop_int()?;
                state.push_int()?;
            }
            LNeg => {
                state.pop_long()?;
                state.push_long()?;
            }
            FNeg => {
                let was_extended = state.pop_float()?;
                state.push_float(was_extended)?;
            }
            DNeg => {
                let was_extended = state.pop_double()?;
                state.push_double(was_extended)?;
            }

            I2L => {
                state.pop_int()?;
                state.push_long()?;
            }
            I2F => {
                state.pop_int()?;
                state.push_float(false)?;
            }
            I2D => {
                state.pop_int()?;
                state.push_double(false)?;
            }
            L2I => {
                state.pop_long()?;
                state.push_int()?;
            }
            L2F => {
                state.pop_long()?;
                state.push_float(false)?;
            }
            L2D => {
                state.pop_long()?;
                state.push_double(false)?;
            }
            F2I => {
                state.pop_float()?;
                state.push_int()?;
            }
            F2L => {
                state.pop_float()?;
                state.push_long()?;
            }
            F2D => {
                state.pop_float()?;
                state.push_double(false)?;
            }
            D2I => {
                state.pop_double()?;
                state.push_int()?;
            }
            D2L => {
                state.pop_double()?;
                state.push_long()?;
            }
            D2F => {
                state.pop_double()?;
                state.push_float(false)?;
            }

            LCmp => {
                state.pop_long()?;
                state.pop_long()?;
                state.push_int()?;
            }
            FCmp(_) => {
                state.pop_float()?;
                state.pop_float()?;
                state.push_int()?;
            }
            DCmp(_) => {
                state.pop_double()?;
                state.pop_double()?;
                state.push_int()?;
            }

            If(_, _) | TableSwitch { .. } | LookupSwitch { .. } => state.pop_int()?,
            IfICmp(_, _) => {
                state.pop_int()?;
                state.pop_int()?;
            }
            IfNull(_, _) | MonitorEnter | MonitorExit => {
                state.pop_object()?;
            }
            IfACmp(_, _) => {
                state.pop_object()?;
                state.pop_object()?;
            }
            Ret(idx) => {
                let subroutine = state.get_local_ret(*idx as usize, self.readers(index))?;
                state.check_subroutine_active(subroutine)?;
            }

            Return => {
                if ctx.descriptor.return_type.is_some() {
                    return Err(VerifyErrorKind::WrongReturnType);
                }
                state.check_uninitialized_this()?;
            }
            IReturn => {
                state.pop_int()?;
                match ctx.descriptor.return_type {
                    Some(FieldType::Base(base_type)) if base_type.is_int_like() => (),
                    _ => return Err(VerifyErrorKind::WrongReturnType),
                }
            }
            LReturn => {
                state.pop_long()?;
                if ctx.descriptor.return_type != Some(FieldType::long()) {
                    return Err(VerifyErrorKind::WrongReturnType);
                }
            }
            FReturn => {
                state.pop_float()?;
                if ctx.descriptor.return_type != Some(FieldType::float()) {
                    return Err(VerifyErrorKind::WrongReturnType);
                }
            }
            DReturn => {
                state.pop_double()?;
                if ctx.descriptor.return_type != Some(FieldType::double()) {
                    return Err(VerifyErrorKind::WrongReturnType);
                }
            }
            AReturn => match ctx.descriptor.return_type {
                Some(FieldType::Ref(return_type)) => {
                    state.pop_object_of(&return_type, graph)?;
                }
                _ => {
                    state.pop_object()?;
                    return Err(VerifyErrorKind::WrongReturnType);
                }
            },
            AThrow => {
                let throwable = RefType::Object(graph.core_class(CoreClass::Throwable));
                state.pop_object_of(&throwable, graph)?;
            }

            GetStatic(idx) | DynamicGetStatic(idx) => {
                let field = constants.field_ref(*idx)?;
                state.push(field_value_type(field, graph))?;
            }
            PutStatic(idx) | DynamicPutStatic(idx) => {
                let field = constants.field_ref(*idx)?;
                state.pop_type(VType::from(field.descriptor), graph)?;
            }
            GetField(idx) | DynamicGetField(idx) => {
                let field = constants.field_ref(*idx)?;
                state.pop_object_of(&RefType::Object(field.class), graph)?;
                state.push(field_value_type(field, graph))?;
            }
            PutField(idx) | DynamicPutField(idx) => {
                let field = constants.field_ref(*idx)?;
                state.pop_type(VType::from(field.descriptor), graph)?;

                // Fields may be set on `this` before the superclass constructor is called
                let owner = RefType::Object(field.class);
                if state.peek()? == VType::UninitializedThis
                    && graph.is_assignable(&RefType::Object(ctx.this_class()), &owner)
                {
                    state.pop()?;
                } else {
                    state.pop_object_of(&owner, graph)?;
                }
            }

            Invoke(invoke_type, idx) | DynamicInvoke(invoke_type, idx) => {
                let (method, _) = constants.method_ref(*idx)?;
                state.pop_many(method.descriptor.parameters.len())?;

                if *invoke_type != InvokeType::Static {
                    let receiver = state.pop()?;
                    if method.name == UnqualifiedName::INIT {
                        if receiver == VType::UninitializedThis {
                            let this_type = VType::This(ctx.this_class());
                            if state.local(0) == Some(VType::UninitializedThis) {
                                state.set_local(0, this_type, store_site)?;
                            }
                            state.mark_initialized(
                                receiver,
                                VType::object(ctx.this_class()),
                                index,
                            );
                            state.set_uninitialized_this(false);
                        } else if let VType::New { class, .. } = receiver {
                            state.mark_initialized(receiver, VType::object(class), index);
                        }
                        // Anything else gets rejected by the reachability pass
                    }
                }

                let resolved_return = method
                    .resolved
                    .as_ref()
                    .and_then(|resolved| resolved.descriptor.return_type);
                match (method.descriptor.return_type, resolved_return) {
                    (None, _) => (),
                    (_, Some(FieldType::Ref(resolved))) if graph.is_type_unloadable(&resolved) => {
                        state.push(VType::Object(resolved))?;
                    }
                    (Some(FieldType::Base(BaseType::Float)), _) => state.push_float(extended)?,
                    (Some(FieldType::Base(BaseType::Double)), _) => state.push_double(extended)?,
                    (Some(return_type), _) => state.push(VType::from(return_type))?,
                }
            }
            CloneArray => {
                state.pop_object()?;
                state.push(VType::object(graph.core_class(CoreClass::Object)))?;
            }

            New(idx) => {
                let class = match constants.class(*idx)? {
                    RefType::Object(class) => *class,
                    _ => return Err(VerifyErrorKind::IllegalArrayType),
                };
                state.push(VType::New {
                    class,
                    pc: self.code.instructions[index].pc,
                })?;
            }
            NewArray(type_code) => {
                state.pop_int()?;
                let element_type = BaseType::from_array_type_code(*type_code)
                    .ok_or(VerifyErrorKind::BadArrayTypeCode)?;
                state.push(VType::Object(RefType::array(FieldType::Base(element_type))))?;
            }
            ANewArray(idx) => {
                state.pop_int()?;
                let element_type = *constants.class(*idx)?;
                state.push(VType::Object(RefType::array(FieldType::Ref(element_type))))?;
            }
            MultiANewArray(idx, dimensions) => {
                if *dimensions < 1 {
                    return Err(VerifyErrorKind::IllegalDimension);
                }
                for _ in 0..*dimensions {
                    state.pop_int()?;
                }
                let array_type = *constants.class(*idx)?;
                if array_type.dimensions() < *dimensions as usize {
                    return Err(VerifyErrorKind::IllegalDimension);
                }
                state.push(VType::Object(array_type))?;
            }
            ArrayLength => {
                state.pop_array(graph)?;
                state.push_int()?;
            }
            CheckCast(idx) => {
                state.pop_object()?;
                let class = *constants.class(*idx)?;
                state.push(VType::Object(class))?;
            }
            InstanceOf(idx) => {
                state.pop_object()?;
                constants.class(*idx)?;
                state.push_int()?;
            }
        }
        Ok(())
    }

    /// Stores read by the instruction
    fn readers(&mut self, index: usize) -> &mut BTreeSet<StoreSite> {
        self.dataflow.readers[index].get_or_insert_with(BTreeSet::new)
    }
}

fn push_all<C: Copy + Eq>(
    state: &mut InstructionState<C>,
    values: &[VType<C>],
) -> Result<(), VerifyErrorKind> {
    for value in values {
        state.push(*value)?;
    }
    Ok(())
}

/// Load from an array of primitives
fn array_load<G: TypeGraph>(
    state: &mut InstructionState<G::Class>,
    element_type: BaseType,
    graph: &G,
) -> Result<(), VerifyErrorKind> {
    state.pop_int()?;
    state.pop_object_of(&RefType::array(FieldType::Base(element_type)), graph)?;
    state.push(widen(element_type))
}

/// Store into an array of primitives (the value has already been popped)
fn array_store<G: TypeGraph>(
    state: &mut InstructionState<G::Class>,
    element_type: BaseType,
    graph: &G,
) -> Result<(), VerifyErrorKind> {
    state.pop_int()?;
    state.pop_object_of(&RefType::array(FieldType::Base(element_type)), graph)?;
    Ok(())
}

/// `baload` and `bastore` work on both `byte[]` and `boolean[]`
fn check_byte_or_boolean_array<G: TypeGraph>(
    array: &VType<G::Class>,
    graph: &G,
) -> Result<(), VerifyErrorKind> {
    let byte_array = RefType::array(FieldType::Base(BaseType::Byte));
    let boolean_array = RefType::array(FieldType::boolean());
    match array.ref_type() {
        _ if array.is_null_or_unloadable(graph) => Ok(()),
        Some(array_type) if *array_type == byte_array || *array_type == boolean_array => Ok(()),
        _ => Err(VerifyErrorKind::ExpectedByteOrBooleanArray),
    }
}

/// Type pushed by reading a field
///
/// The resolved field's type wins if it is unloadable, so that the value isn't used as if it had
/// the (possibly loadable) type of the reference.
fn field_value_type<G: TypeGraph>(
    field: &crate::jvm::FieldRef<G::Class>,
    graph: &G,
) -> VType<G::Class> {
    match &field.resolved {
        Some(resolved) => match resolved.field_type {
            FieldType::Ref(field_type) if graph.is_type_unloadable(&field_type) => {
                VType::Object(field_type)
            }
            _ => VType::from(field.descriptor),
        },
        None => VType::from(field.descriptor),
    }
}

use super::access::is_member_accessible;
use super::analyzer::{branch_target, Dataflow};
use super::state::InstructionState;
use super::types::{ref_type_name, VerificationType};
use super::{render_descriptor, Context};
use crate::jvm::{
    Code, Constant, CoreClass, Error, FieldAccessFlags, FieldType, HardErrorKind, Instruction,
    InvokeType, MemberAccessFlags, MethodAccessFlags, Op, OrdComparison, RefType, TypeGraph,
    UnqualifiedName, VerifyErrorKind,
};
use std::collections::HashSet;

type VType<C> = VerificationType<C>;

/// Which instructions can actually run
pub(super) struct Reachability {
    pub reachable: Vec<bool>,

    /// Instructions control can arrive at other than by falling through from the previous one
    pub branch_targets: Vec<bool>,

    /// Messages of the errors deferred to runtime
    pub error_messages: Vec<String>,
}

/// Change to make to an instruction after checking it
enum Rewrite {
    /// Replace with a more specific instruction
    Replace(Instruction),

    /// The instruction fails when executed
    Defer(HardErrorKind, String),
}

/// Turn `getstatic $assertionsDisabled; ifne L` into `goto L`
///
/// Only the synthetic field `javac` generates in the class itself counts, and the `ifne` can't be
/// the target of any jump.
pub(super) fn remove_assertions<G: TypeGraph>(ctx: &Context<G>, code: &mut Code) {
    let mut targets = HashSet::new();
    for (index, instruction) in code.instructions.iter().enumerate() {
        for offset in instruction.op.instruction().branch_offsets() {
            if let Ok(target) = branch_target(code, index, offset) {
                targets.insert(target);
            }
        }
    }
    for handler in &code.exception_table {
        targets.extend(code.index_of(handler.handler_pc));
    }

    let synthetic_flags = FieldAccessFlags::STATIC | FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC;
    let relevant_flags = synthetic_flags
        | FieldAccessFlags::PUBLIC
        | FieldAccessFlags::PRIVATE
        | FieldAccessFlags::PROTECTED;

    for index in 1..code.instructions.len() {
        let (getstatic, ifne) = (&code.instructions[index - 1], &code.instructions[index]);
        let (field_idx, offset) = match (&getstatic.op, &ifne.op) {
            (
                Op::Resolved(Instruction::GetStatic(field_idx)),
                Op::Resolved(Instruction::If(OrdComparison::NE, offset)),
            ) if *offset > 0 && !targets.contains(&index) => (*field_idx, *offset),
            _ => continue,
        };

        let is_assertion_flag = match ctx.class.constants.field_ref(field_idx) {
            Ok(field) => {
                field.class == ctx.this_class()
                    && field.name == UnqualifiedName::ASSERTIONSDISABLED
                    && field.resolved.as_ref().map_or(false, |resolved| {
                        resolved.field_type == FieldType::boolean()
                            && resolved.access_flags & relevant_flags == synthetic_flags
                    })
            }
            Err(_) => false,
        };
        if is_assertion_flag {
            let jump = (ifne.pc as i32) + offset - (getstatic.pc as i32);
            log::debug!(
                "Removing assertion at offset {} of {}",
                getstatic.pc,
                ctx.qualified_name()
            );
            code.instructions[index - 1].op = Op::Resolved(Instruction::Goto(jump));
        }
    }
}

/// Find the reachable instructions, checking them against the type graph
///
/// Instructions may get rewritten along the way, into more specific instructions or into
/// deferred errors.
pub(super) fn check<G: TypeGraph>(
    ctx: &Context<G>,
    code: &mut Code,
    dataflow: &Dataflow<G::Class>,
) -> Result<Reachability, Error> {
    let len = code.instructions.len();
    let mut reachable = vec![false; len];
    let mut processed = vec![false; len];
    let mut branch_targets = vec![false; len];
    let mut error_messages = vec![];
    reachable[0] = true;

    loop {
        let mut progress = false;
        let mut did_jsr_or_ret = false;

        for index in 0..len {
            if !reachable[index] || processed[index] {
                continue;
            }
            processed[index] = true;
            progress = true;

            let state = match dataflow.states[index].as_ref() {
                Some(state) => state,
                None => continue,
            };
            let pc = code.instructions[index].pc;

            if !code.instructions[index].op.is_deferred() {
                let instruction = code.instructions[index].op.instruction().clone();
                let rewrite = check_instruction(ctx, &instruction, state.clone())
                    .map_err(|kind| ctx.error(kind, pc, &instruction))?;
                match rewrite {
                    None => (),
                    Some(Rewrite::Replace(replacement)) => {
                        log::trace!("Rewriting {:?} at {} to {:?}", instruction, pc, replacement);
                        code.instructions[index].op = Op::Resolved(replacement);
                    }
                    Some(Rewrite::Defer(kind, message)) => {
                        if ctx.settings.fail_on_deferred_errors {
                            return Err(Error::DeferredFailure { kind, message });
                        }
                        if ctx.settings.is_ahead_of_time() {
                            log::warn!(
                                "{} at offset {} of {}: {}",
                                kind,
                                pc,
                                ctx.qualified_name(),
                                message
                            );
                        }
                        let message_id = error_messages.len();
                        error_messages.push(message);
                        code.instructions[index].op = Op::Deferred {
                            instruction,
                            kind,
                            message_id,
                        };
                    }
                }
            }

            for handler in &code.exception_table {
                if handler.start_pc <= pc && pc < handler.end_pc {
                    if let Some(target) = code.index_of(handler.handler_pc) {
                        reachable[target] = true;
                        branch_targets[target] = true;
                    }
                }
            }

            let op = &code.instructions[index].op;
            let instruction = match op {
                Op::Resolved(instruction) => instruction,
                Op::Deferred { .. } => continue,
            };
            let fail = |kind| ctx.error(kind, pc, instruction);

            match instruction {
                Instruction::Jsr(offset) => {
                    state.check_uninitialized_objects().map_err(fail)?;
                    let target = branch_target(code, index, *offset).map_err(fail)?;
                    reachable[target] = true;
                    branch_targets[target] = true;
                    did_jsr_or_ret = true;
                }
                Instruction::Ret(_) => did_jsr_or_ret = true,
                _ => {
                    let offsets = instruction.branch_offsets();
                    if offsets.iter().any(|offset| *offset < 0) {
                        state.check_uninitialized_objects().map_err(fail)?;
                    }
                    for offset in offsets {
                        let target = branch_target(code, index, offset).map_err(fail)?;
                        reachable[target] = true;
                        branch_targets[target] = true;
                    }
                    if instruction.falls_through() && index + 1 < len {
                        reachable[index + 1] = true;
                    }
                }
            }
        }

        // Subroutines return to right after the call sites which are reachable
        if did_jsr_or_ret {
            for index in 0..len {
                let local = match code.instructions[index].op.instruction() {
                    Instruction::Ret(local) if reachable[index] => *local as usize,
                    _ => continue,
                };
                let state = match dataflow.states[index].as_ref() {
                    Some(state) => state,
                    None => continue,
                };
                if let Some(VerificationType::Ret(subroutine)) = state.local(local) {
                    for call_site in &dataflow.call_sites[subroutine] {
                        if reachable[*call_site] && call_site + 1 < len {
                            reachable[call_site + 1] = true;
                            branch_targets[call_site + 1] = true;
                        }
                    }
                }
            }
        }

        if !progress {
            break;
        }
    }

    log::debug!(
        "{} of {} instructions reachable in {}",
        reachable.iter().filter(|r| **r).count(),
        len,
        ctx.qualified_name()
    );
    Ok(Reachability {
        reachable,
        branch_targets,
        error_messages,
    })
}

/// Check a reachable instruction in its inferred state
fn check_instruction<G: TypeGraph>(
    ctx: &Context<G>,
    instruction: &Instruction,
    mut state: InstructionState<G::Class>,
) -> Result<Option<Rewrite>, VerifyErrorKind> {
    use Instruction::*;

    let graph = ctx.graph;
    let constants = &ctx.class.constants;
    let narrow = ctx.settings.extended_precision && !ctx.is_strict();
    let top = state.peek().ok();

    let rewrite = match instruction {
        FStore(idx) if narrow && top == Some(VType::ExtendedFloat) => {
            Some(Rewrite::Replace(FStoreConv(*idx)))
        }
        DStore(idx) if narrow && top == Some(VType::ExtendedDouble) => {
            Some(Rewrite::Replace(DStoreConv(*idx)))
        }
        FAStore if narrow && top == Some(VType::ExtendedFloat) => {
            Some(Rewrite::Replace(FAStoreConv))
        }
        DAStore if narrow && top == Some(VType::ExtendedDouble) => {
            Some(Rewrite::Replace(DAStoreConv))
        }

        Invoke(invoke_type, idx) => verify_invoke(ctx, *invoke_type, *idx, state)?,
        GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_) => {
            verify_field_access(ctx, instruction, state)?
        }

        Ldc(idx) => match constants.get(*idx)? {
            Constant::Class(class) => missing_class(ctx, class),
            _ => None,
        },
        New(idx) => {
            let class = constants.class(*idx)?;
            if graph.is_type_unloadable(class) {
                missing_class(ctx, class)
            } else if !graph.is_type_accessible(class, ctx.this_class()) {
                Some(inaccessible_class(ctx, class))
            } else {
                match class {
                    RefType::Object(class) if graph.is_abstract(*class) => Some(Rewrite::Defer(
                        HardErrorKind::Instantiation,
                        graph.java_name(*class),
                    )),
                    _ => None,
                }
            }
        }
        ANewArray(idx) | MultiANewArray(idx, _) => {
            let class = constants.class(*idx)?;
            if graph.is_type_unloadable(class) {
                missing_class(ctx, class)
            } else if !graph.is_type_accessible(class, ctx.this_class()) {
                Some(inaccessible_class(ctx, class))
            } else {
                None
            }
        }
        CheckCast(idx) | InstanceOf(idx) => {
            let class = constants.class(*idx)?;
            if !graph.is_type_unloadable(class) && !graph.is_type_accessible(class, ctx.this_class())
            {
                Some(inaccessible_class(ctx, class))
            } else {
                None
            }
        }

        AALoad => {
            state.pop_int()?;
            let array = state.pop_array(graph)?;
            match array.ref_type() {
                _ if array == VType::Null => None,
                _ if array.is_unloadable(graph) => missing_array_class(ctx, &array),
                Some(array_type) => match array_type.component_type() {
                    Some(FieldType::Ref(_)) => None,
                    _ => return Err(VerifyErrorKind::ExpectedObjectArray),
                },
                None => return Err(VerifyErrorKind::ExpectedObjectArray),
            }
        }
        AAStore => {
            state.pop_object()?;
            state.pop_int()?;
            let array = state.pop_array(graph)?;
            if array.is_unloadable(graph) {
                missing_array_class(ctx, &array)
            } else {
                None
            }
        }

        _ => None,
    };
    Ok(rewrite)
}

/// Referencing a class which couldn't be loaded only fails if every class is already known
fn missing_class<G: TypeGraph>(ctx: &Context<G>, class: &RefType<G::Class>) -> Option<Rewrite> {
    if ctx.settings.is_ahead_of_time() && ctx.graph.is_type_unloadable(class) {
        Some(Rewrite::Defer(
            HardErrorKind::NoClassDefFound,
            ref_type_name(class, ctx.graph),
        ))
    } else {
        None
    }
}

fn missing_array_class<G: TypeGraph>(
    ctx: &Context<G>,
    array: &VType<G::Class>,
) -> Option<Rewrite> {
    if ctx.settings.is_ahead_of_time() {
        Some(Rewrite::Defer(
            HardErrorKind::NoClassDefFound,
            array.display(ctx.graph),
        ))
    } else {
        None
    }
}

fn inaccessible_class<G: TypeGraph>(ctx: &Context<G>, class: &RefType<G::Class>) -> Rewrite {
    Rewrite::Defer(
        HardErrorKind::IllegalAccess,
        format!(
            "Try to access class {} from class {}",
            ref_type_name(class, ctx.graph),
            ctx.class_name
        ),
    )
}

/// Type of the object a member gets accessed on
fn receiver_type<C: Copy + Eq>(value: VType<C>, this_class: C, referenced: RefType<C>) -> VType<C> {
    match value {
        VType::UninitializedThis => VType::object(this_class),
        VType::New { class, .. } => VType::object(class),
        VType::Null => VType::Object(referenced),
        other => other.unwrap_this(),
    }
}

/// Check the receiver and arguments of a method call, then link the call
fn verify_invoke<G: TypeGraph>(
    ctx: &Context<G>,
    invoke_type: InvokeType,
    idx: u16,
    mut state: InstructionState<G::Class>,
) -> Result<Option<Rewrite>, VerifyErrorKind> {
    let graph = ctx.graph;
    let this_class = ctx.this_class();
    let (method, is_interface_ref) = ctx.class.constants.method_ref(idx)?;
    let is_interface_call = matches!(invoke_type, InvokeType::Interface(_));
    let is_static_call = invoke_type == InvokeType::Static;
    let is_constructor = method.name == UnqualifiedName::INIT;

    if is_interface_ref != is_interface_call {
        return Err(VerifyErrorKind::IllegalConstantPoolIndex);
    }
    if is_constructor && invoke_type != InvokeType::Special {
        return Err(VerifyErrorKind::InitializerNotInvokespecial);
    }
    if method.name == UnqualifiedName::CLINIT {
        return Err(VerifyErrorKind::InternalMethodCall);
    }

    for parameter in method.descriptor.parameters.iter().rev() {
        state.pop_type(VType::from(*parameter), graph)?;
    }
    if let InvokeType::Interface(count) = invoke_type {
        if count as usize != method.descriptor.parameter_length(true) {
            return Err(VerifyErrorKind::InconsistentArgsSize);
        }
    }

    let target_unloadable = graph.is_type_unloadable(&method.class);
    let target_is_interface = match method.class {
        RefType::Object(class) => !graph.is_unloadable(class) && graph.is_interface(class),
        _ => false,
    };

    let mut receiver = None;
    let mut this_type = None;
    if !is_static_call {
        let top = state.peek()?;
        receiver = Some(top);
        this_type = Some(receiver_type(top, this_class, method.class));

        if is_constructor {
            state.pop()?;
            let valid_initializer = match top {
                VType::New { class, .. } => method.class == RefType::Object(class),
                VType::UninitializedThis => {
                    method.class == RefType::Object(this_class)
                        || graph
                            .superclass(this_class)
                            .map_or(false, |superclass| method.class == RefType::Object(superclass))
                }
                _ => false,
            };
            if !valid_initializer {
                return Err(VerifyErrorKind::WrongInitializer);
            }
        } else {
            let object = state.pop_object()?;
            let compatible = object.is_null_or_unloadable(graph)
                || target_unloadable
                || (is_interface_call && target_is_interface)
                || object.is_assignable_to(&method.class, graph);
            if !compatible {
                return Err(VerifyErrorKind::IncompatibleObjectArgument);
            }

            if invoke_type == InvokeType::Special {
                if !object.is_null_or_unloadable(graph) && !object.is_subclass_of(this_class, graph) {
                    return Err(VerifyErrorKind::IncompatibleInvokespecialTarget);
                }
                if !target_unloadable
                    && !graph.is_assignable(&RefType::Object(this_class), &method.class)
                {
                    return Err(VerifyErrorKind::InvokespecialSubclassMethod);
                }
            }
        }
    }

    let class_name = ref_type_name(&method.class, graph);
    let descriptor = render_descriptor(graph, &method.descriptor);

    if target_unloadable || this_type.map_or(false, |this_type| this_type.is_unloadable(graph)) {
        let rewrite = if ctx.settings.is_ahead_of_time() {
            Rewrite::Defer(HardErrorKind::NoClassDefFound, class_name)
        } else if invoke_type == InvokeType::Special
            && !matches!(receiver, Some(VType::New { .. }))
        {
            Rewrite::Defer(
                HardErrorKind::Linkage,
                String::from("Base class no longer loadable"),
            )
        } else {
            Rewrite::Replace(Instruction::DynamicInvoke(invoke_type, idx))
        };
        return Ok(Some(rewrite));
    }

    let class_is_interface = match method.class {
        RefType::Object(class) => graph.is_interface(class),
        _ => false,
    };
    if class_is_interface != is_interface_call {
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::IncompatibleClassChange,
            String::from("invokeinterface on non-interface"),
        )));
    }

    let resolved = match &method.resolved {
        Some(resolved) => resolved,
        None => {
            return Ok(Some(Rewrite::Defer(
                HardErrorKind::NoSuchMethod,
                format!("{}.{}{}", class_name, method.name, descriptor),
            )))
        }
    };
    let declaring_name = graph.java_name(resolved.class);
    let member_name = format!("{}.{}{}", declaring_name, method.name, descriptor);

    let resolved_return_unloadable = match &resolved.descriptor.return_type {
        Some(FieldType::Ref(return_type)) => graph.is_type_unloadable(return_type),
        _ => false,
    };
    if resolved.descriptor.return_type != method.descriptor.return_type && !resolved_return_unloadable
    {
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::Linkage,
            format!("Loader constraints violated (return type): {}", member_name),
        )));
    }
    let mismatched_arg = resolved
        .descriptor
        .parameters
        .iter()
        .zip(method.descriptor.parameters.iter())
        .position(|(resolved_param, param)| resolved_param != param);
    if let Some(arg) = mismatched_arg {
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::Linkage,
            format!("Loader constraints violated (arg {}): {}", arg, member_name),
        )));
    }

    let resolved_static = resolved.access_flags.is_static();
    if resolved_static != is_static_call {
        let message = if is_static_call {
            "static call to non-static method"
        } else {
            "non-static call to static method"
        };
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::IncompatibleClassChange,
            String::from(message),
        )));
    }

    if resolved.access_flags.contains(MethodAccessFlags::ABSTRACT)
        && invoke_type == InvokeType::Special
    {
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::AbstractMethod,
            format!("{}.{}{}", class_name, method.name, descriptor),
        )));
    }

    if is_member_accessible(
        graph,
        resolved.access_flags,
        resolved.class,
        &method.class,
        this_class,
        this_type,
    ) {
        return Ok(None);
    }

    // `clone` is protected on `Object` but public on arrays
    let object = RefType::Object(graph.core_class(CoreClass::Object));
    let on_array = this_type.map_or(false, |this_type| this_type.array_rank() > 0);
    if method.class == object && on_array && method.name == UnqualifiedName::CLONE {
        return Ok(Some(Rewrite::Replace(Instruction::CloneArray)));
    }

    Ok(Some(Rewrite::Defer(
        HardErrorKind::IllegalAccess,
        format!(
            "Try to access method {} from class {}",
            member_name, ctx.class_name
        ),
    )))
}

/// Check the operands of a field access, then link the access
fn verify_field_access<G: TypeGraph>(
    ctx: &Context<G>,
    instruction: &Instruction,
    mut state: InstructionState<G::Class>,
) -> Result<Option<Rewrite>, VerifyErrorKind> {
    let graph = ctx.graph;
    let this_class = ctx.this_class();

    let (idx, is_static, is_put) = match instruction {
        Instruction::GetStatic(idx) => (*idx, true, false),
        Instruction::PutStatic(idx) => (*idx, true, true),
        Instruction::GetField(idx) => (*idx, false, false),
        Instruction::PutField(idx) => (*idx, false, true),
        _ => return Ok(None),
    };
    let field = ctx.class.constants.field_ref(idx)?;
    let owner = RefType::Object(field.class);

    if is_put {
        state.pop_type(VType::from(field.descriptor), graph)?;
    }
    let this_type = if is_static {
        None
    } else if is_put
        && state.peek()? == VType::UninitializedThis
        && graph.is_assignable(&RefType::Object(this_class), &owner)
    {
        Some(VType::object(this_class))
    } else {
        let object = state.pop_object_of(&owner, graph)?;
        Some(receiver_type(object, this_class, owner))
    };

    let class_name = graph.java_name(field.class);
    if graph.is_unloadable(field.class)
        || this_type.map_or(false, |this_type| this_type.is_unloadable(graph))
    {
        let rewrite = if ctx.settings.is_ahead_of_time() {
            Rewrite::Defer(HardErrorKind::NoClassDefFound, class_name)
        } else {
            Rewrite::Replace(match (is_static, is_put) {
                (true, false) => Instruction::DynamicGetStatic(idx),
                (true, true) => Instruction::DynamicPutStatic(idx),
                (false, false) => Instruction::DynamicGetField(idx),
                (false, true) => Instruction::DynamicPutField(idx),
            })
        };
        return Ok(Some(rewrite));
    }

    let resolved = match &field.resolved {
        Some(resolved) => resolved,
        None => {
            return Ok(Some(Rewrite::Defer(
                HardErrorKind::NoSuchField,
                format!("{}.{}", class_name, field.name),
            )))
        }
    };
    let member_name = format!("{}.{}", graph.java_name(resolved.class), field.name);

    let resolved_unloadable = match &resolved.field_type {
        FieldType::Ref(field_type) => graph.is_type_unloadable(field_type),
        FieldType::Base(_) => false,
    };
    if resolved.field_type != field.descriptor && !resolved_unloadable {
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::Linkage,
            format!("Loader constraints violated: {}", member_name),
        )));
    }

    if resolved.access_flags.is_static() != is_static {
        let message = if is_static {
            "Static field access to non-static field"
        } else {
            "Non-static field access to static field"
        };
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::IncompatibleClassChange,
            String::from(message),
        )));
    }

    if !is_member_accessible(
        graph,
        resolved.access_flags,
        resolved.class,
        &owner,
        this_class,
        this_type,
    ) {
        return Ok(Some(Rewrite::Defer(
            HardErrorKind::IllegalAccess,
            format!(
                "Try to access field {} from class {}",
                member_name, ctx.class_name
            ),
        )));
    }

    if is_put && resolved.access_flags.contains(FieldAccessFlags::FINAL) {
        let strict = ctx.settings.strict_final_field_semantics;
        let illegal_write = if is_static {
            field.class != this_class || strict && ctx.name != UnqualifiedName::CLINIT
        } else {
            this_type != Some(VType::object(this_class))
                || strict && ctx.name != UnqualifiedName::INIT
        };
        if illegal_write {
            return Ok(Some(Rewrite::Defer(
                HardErrorKind::IllegalAccess,
                format!("Field {} is final", member_name),
            )));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{
        ClassData, ClassGraph, ClassGraphArenas, ClassId, FieldData, MethodData,
    };
    use crate::jvm::verifier::{verify_method, ResolutionMode, Settings};
    use crate::jvm::Instruction::*;
    use crate::jvm::*;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn member(name: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(String::from(name)).unwrap()
    }

    fn method<'g>(
        graph: &ClassGraph<'g>,
        name: &str,
        descriptor: &str,
        access_flags: MethodAccessFlags,
        code: Code,
    ) -> MethodInfo<ClassId<'g>> {
        MethodInfo {
            name: member(name),
            descriptor: graph.parse_method_descriptor(descriptor).unwrap(),
            access_flags,
            code,
        }
    }

    fn class_info<'g>(this_class: ClassId<'g>, constants: ConstantPool<ClassId<'g>>) -> ClassInfo<ClassId<'g>> {
        ClassInfo {
            this_class,
            major_version: 52,
            constants,
        }
    }

    #[test]
    fn assertions_become_jumps() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let counter = graph.add_class(ClassData::new(
            name("me/alec/Counter"),
            graph.java.object,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        graph.add_field(FieldData {
            class: counter,
            name: UnqualifiedName::ASSERTIONSDISABLED,
            descriptor: FieldType::boolean(),
            access_flags: FieldAccessFlags::STATIC
                | FieldAccessFlags::FINAL
                | FieldAccessFlags::SYNTHETIC,
        });
        let mut constants = ConstantPool::new();
        let flag = constants.push(Constant::FieldRef(graph.field_ref(
            counter,
            UnqualifiedName::ASSERTIONSDISABLED,
            FieldType::boolean(),
        )));
        let class = class_info(counter, constants);

        let code = || {
            Code::new(
                1,
                0,
                vec![
                    GetStatic(flag),          // 0
                    If(OrdComparison::NE, 5), // 3
                    IConst(0),                // 6
                    Pop,                      // 7
                    Return,                   // 8
                ],
            )
        };

        let mut kept = method(&graph, "run", "()V", MethodAccessFlags::STATIC, code());
        let analysis = verify_method(&graph, &class, &mut kept, &Settings::new()).unwrap();
        assert_eq!(kept.code.instructions[0].op, Op::Resolved(GetStatic(flag)));
        assert!(analysis.is_reachable(2));

        let settings = Settings {
            remove_assertions: true,
            ..Settings::new()
        };
        let mut removed = method(&graph, "run", "()V", MethodAccessFlags::STATIC, code());
        let analysis = verify_method(&graph, &class, &mut removed, &settings).unwrap();
        assert_eq!(removed.code.instructions[0].op, Op::Resolved(Goto(8)));
        assert!(!analysis.is_reachable(1));
        assert!(!analysis.is_reachable(2));
        assert!(analysis.is_reachable(4));
        assert!(analysis.is_branch_target(4));
    }

    #[test]
    fn missing_classes() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let app = graph.add_class(ClassData::new(
            name("me/alec/App"),
            graph.java.object,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        let missing = graph.add_unloadable(name("gone/Missing"));
        let mut constants = ConstantPool::new();
        let missing_class = constants.push(Constant::Class(RefType::Object(missing)));
        let run = constants.push(Constant::MethodRef(graph.method_ref(
            RefType::Object(missing),
            member("run"),
            graph.parse_method_descriptor("()V").unwrap(),
        )));
        let class = class_info(app, constants);

        let code = || {
            Code::new(
                2,
                0,
                vec![New(missing_class), Invoke(InvokeType::Static, run), Pop, Return],
            )
        };

        // Everything is known, so the class really is missing
        let mut m = method(&graph, "go", "()V", MethodAccessFlags::STATIC, code());
        let analysis = verify_method(&graph, &class, &mut m, &Settings::new()).unwrap();
        match &m.code.instructions[0].op {
            Op::Deferred {
                instruction: New(_),
                kind: HardErrorKind::NoClassDefFound,
                message_id,
            } => assert_eq!(analysis.error_message(*message_id), Some("gone.Missing")),
            other => panic!("unexpected op {:?}", other),
        }
        assert!(!analysis.is_reachable(1));
        assert_eq!(
            m.code.instructions[1].op,
            Op::Resolved(Invoke(InvokeType::Static, run))
        );

        // The class may show up later
        let settings = Settings {
            resolution: ResolutionMode::Dynamic,
            ..Settings::new()
        };
        let mut m = method(&graph, "go", "()V", MethodAccessFlags::STATIC, code());
        let analysis = verify_method(&graph, &class, &mut m, &settings).unwrap();
        assert_eq!(m.code.instructions[0].op, Op::Resolved(New(missing_class)));
        assert_eq!(
            m.code.instructions[1].op,
            Op::Resolved(DynamicInvoke(InvokeType::Static, run))
        );
        assert!(analysis.is_reachable(3));

        // Or verification can just fail
        let settings = Settings {
            fail_on_deferred_errors: true,
            ..Settings::new()
        };
        let mut m = method(&graph, "go", "()V", MethodAccessFlags::STATIC, code());
        let err = verify_method(&graph, &class, &mut m, &settings).unwrap_err();
        assert_eq!(err.to_string(), "java.lang.NoClassDefFoundError: gone.Missing");
    }

    #[test]
    fn member_access_checks() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let vault = graph.add_class(ClassData::new(
            name("bank/Vault"),
            graph.java.object,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
            vec![],
        ));
        let robber = graph.add_class(ClassData::new(
            name("heist/Robber"),
            graph.java.object,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        graph.add_method(MethodData {
            class: vault,
            name: member("open"),
            descriptor: graph.parse_method_descriptor("()V").unwrap(),
            access_flags: MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC,
        });
        graph.add_field(FieldData {
            class: vault,
            name: member("GOLD"),
            descriptor: FieldType::int(),
            access_flags: FieldAccessFlags::PUBLIC
                | FieldAccessFlags::STATIC
                | FieldAccessFlags::FINAL,
        });

        let mut constants = ConstantPool::new();
        let vault_class = constants.push(Constant::Class(RefType::Object(vault)));
        let open = constants.push(Constant::MethodRef(graph.method_ref(
            RefType::Object(vault),
            member("open"),
            graph.parse_method_descriptor("()V").unwrap(),
        )));
        let gold = constants.push(Constant::FieldRef(graph.field_ref(
            vault,
            member("GOLD"),
            FieldType::int(),
        )));
        let silver = constants.push(Constant::FieldRef(graph.field_ref(
            vault,
            member("SILVER"),
            FieldType::int(),
        )));
        let class = class_info(robber, constants);

        let first_deferred = |instructions: Vec<Instruction>| {
            let code = Code::new(2, 0, instructions);
            let mut m = method(&graph, "steal", "()V", MethodAccessFlags::STATIC, code);
            let analysis = verify_method(&graph, &class, &mut m, &Settings::new()).unwrap();
            let deferred = m.code.instructions.iter().position(|i| i.op.is_deferred());
            match deferred.map(|index| &m.code.instructions[index].op) {
                Some(Op::Deferred {
                    kind, message_id, ..
                }) => {
                    // Nothing runs after an instruction which always throws
                    let index = deferred.unwrap();
                    assert!(!analysis.is_reachable(index + 1));
                    let message = analysis.error_message(*message_id).unwrap();
                    (*kind, message.to_owned())
                }
                _ => panic!("nothing deferred in {:?}", m.code.instructions),
            }
        };

        assert_eq!(
            first_deferred(vec![Invoke(InvokeType::Static, open), Return]),
            (
                HardErrorKind::IllegalAccess,
                String::from("Try to access method bank.Vault.open()V from class heist.Robber")
            )
        );
        assert_eq!(
            first_deferred(vec![IConst(0), PutStatic(gold), Return]),
            (
                HardErrorKind::IllegalAccess,
                String::from("Field bank.Vault.GOLD is final")
            )
        );
        assert_eq!(
            first_deferred(vec![GetStatic(silver), Pop, Return]),
            (HardErrorKind::NoSuchField, String::from("bank.Vault.SILVER"))
        );
        assert_eq!(
            first_deferred(vec![New(vault_class), Pop, Return]),
            (HardErrorKind::Instantiation, String::from("bank.Vault"))
        );
    }

    #[test]
    fn narrowing_stores() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let app = graph.add_class(ClassData::new(
            name("me/alec/Math"),
            graph.java.object,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        let class = class_info(app, ConstantPool::new());
        let code = || Code::new(2, 2, vec![FLoad(0), FLoad(0), FMul, FStore(1), Return]);

        let mut m = method(&graph, "square", "(F)V", MethodAccessFlags::STATIC, code());
        verify_method(&graph, &class, &mut m, &Settings::new()).unwrap();
        assert_eq!(m.code.instructions[3].op, Op::Resolved(FStoreConv(1)));

        let strict = MethodAccessFlags::STATIC | MethodAccessFlags::STRICT;
        let mut m = method(&graph, "square", "(F)V", strict, code());
        verify_method(&graph, &class, &mut m, &Settings::new()).unwrap();
        assert_eq!(m.code.instructions[3].op, Op::Resolved(FStore(1)));
    }

    #[test]
    fn clone_on_arrays() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let app = graph.add_class(ClassData::new(
            name("me/alec/Copier"),
            graph.java.object,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        graph.add_method(MethodData {
            class: graph.java.object,
            name: UnqualifiedName::CLONE,
            descriptor: graph.parse_method_descriptor("()Ljava/lang/Object;").unwrap(),
            access_flags: MethodAccessFlags::PROTECTED,
        });
        let mut constants = ConstantPool::new();
        let clone = constants.push(Constant::MethodRef(graph.method_ref(
            RefType::Object(graph.java.object),
            UnqualifiedName::CLONE,
            graph.parse_method_descriptor("()Ljava/lang/Object;").unwrap(),
        )));
        let class = class_info(app, constants);

        let mut m = method(
            &graph,
            "copy",
            "([I)Ljava/lang/Object;",
            MethodAccessFlags::STATIC,
            Code::new(1, 1, vec![ALoad(0), Invoke(InvokeType::Virtual, clone), AReturn]),
        );
        verify_method(&graph, &class, &mut m, &Settings::new()).unwrap();
        assert_eq!(m.code.instructions[1].op, Op::Resolved(CloneArray));
    }
}

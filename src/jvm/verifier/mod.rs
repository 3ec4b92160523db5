//! Bytecode verification utilities
//!
//! [`verify_method`] checks a method body in three passes:
//!
//!   1. Type inference: a fixed point over the instructions, computing the state of the operand
//!      stack and locals before each one. Code which is not type-safe fails right away.
//!   2. Reachability: instructions reachable from the entry point are checked against the type
//!      graph. Member accesses which can only fail at runtime get rewritten into deferred errors
//!      and some instructions get rewritten into more specific variants.
//!   3. Liveness: the loads and stores of each local variable slot are grouped into
//!      [`LocalVar`]s, which a code generator can turn into properly typed variables.

mod access;
mod analyzer;
mod liveness;
mod reachability;
mod settings;
mod state;
mod types;

pub use liveness::LocalVar;
pub use settings::*;
pub use state::{InstructionState, StoreSite, Subroutine};
pub use types::*;

use crate::jvm::{
    ClassInfo, Code, Error, Instruction, MethodAccessFlags, MethodDescriptor, MethodInfo,
    RenderDescriptor, TypeGraph, UnqualifiedName, VerifyErrorKind,
};

/// Method being verified, along with everything else the passes need apart from its code
struct Context<'a, G: TypeGraph> {
    graph: &'a G,
    class: &'a ClassInfo<G::Class>,
    settings: &'a Settings,

    name: UnqualifiedName,
    descriptor: MethodDescriptor<G::Class>,
    access_flags: MethodAccessFlags,

    /// Java name of the class, for error messages
    class_name: String,

    /// Method descriptor, for error messages
    signature: String,
}

impl<'a, G: TypeGraph> Context<'a, G> {
    fn new(
        graph: &'a G,
        class: &'a ClassInfo<G::Class>,
        method: &MethodInfo<G::Class>,
        settings: &'a Settings,
    ) -> Context<'a, G> {
        Context {
            graph,
            class,
            settings,
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access_flags: method.access_flags,
            class_name: graph.java_name(class.this_class),
            signature: render_descriptor(graph, &method.descriptor),
        }
    }

    fn this_class(&self) -> G::Class {
        self.class.this_class
    }

    fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    fn is_strict(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STRICT)
    }

    fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    /// Method name with its descriptor, for log messages
    fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.signature)
    }

    /// Structural failure of the instruction at `pc`
    fn error(&self, kind: VerifyErrorKind, pc: usize, instruction: &Instruction) -> Error {
        log::error!(
            "Verification of {} failed at offset {} ({:?}): {}",
            self.qualified_name(),
            pc,
            instruction,
            kind
        );
        Error::Verification {
            kind,
            class: self.class_name.clone(),
            method: self.name.to_string(),
            signature: self.signature.clone(),
            offset: pc,
            instruction: instruction.mnemonic(),
        }
    }
}

/// Method descriptor, as it would appear in a class file
fn render_descriptor<G: TypeGraph>(graph: &G, descriptor: &MethodDescriptor<G::Class>) -> String {
    descriptor.map(|class| graph.class_name(*class)).render()
}

/// Check the method's code and compute types, reachability, and local variables
///
/// Instructions of the method may get rewritten in place (see [`crate::jvm::Op::Deferred`] and
/// the last few variants of [`Instruction`]), even if verification ends up failing.
pub fn verify_method<G: TypeGraph>(
    graph: &G,
    class: &ClassInfo<G::Class>,
    method: &mut MethodInfo<G::Class>,
    settings: &Settings,
) -> Result<MethodAnalysis<G::Class>, Error> {
    let ctx = Context::new(graph, class, method, settings);
    log::debug!("Verifying {}", ctx.qualified_name());

    let code = &mut method.code;
    check_exception_table(&ctx, code)?;

    let dataflow = analyzer::analyze(&ctx, code)?;
    if settings.remove_assertions {
        reachability::remove_assertions(&ctx, code);
    }
    let reachability = reachability::check(&ctx, code, &dataflow)?;
    let locals = liveness::reconcile(&ctx, code, &dataflow, &reachability);

    Ok(MethodAnalysis {
        states: dataflow.states,
        reachable: reachability.reachable,
        branch_targets: reachability.branch_targets,
        error_messages: reachability.error_messages,
        local_vars: locals.by_instruction,
        invokespecial_local_vars: locals.by_invokespecial,
        all_local_vars: locals.local_vars,
    })
}

/// Exception ranges must start and end on instructions (or at the end of the code), and
/// handlers must be instructions other than the first one
fn check_exception_table<G: TypeGraph>(ctx: &Context<G>, code: &Code) -> Result<(), Error> {
    let len = code.instructions.len();
    for handler in &code.exception_table {
        let valid = match (
            code.index_of(handler.start_pc),
            code.index_of(handler.end_pc),
            code.index_of(handler.handler_pc),
        ) {
            (Some(start), Some(end), Some(target)) => start < end && 0 < target && target < len,
            _ => false,
        };
        if !valid {
            log::error!(
                "Illegal exception table entry in {}: {:?}",
                ctx.qualified_name(),
                handler
            );
            return Err(Error::IllegalExceptionTable {
                class: ctx.class_name.clone(),
                method: ctx.name.to_string(),
                signature: ctx.signature.clone(),
            });
        }
    }
    Ok(())
}

/// Outcome of verifying a method
#[derive(Debug)]
pub struct MethodAnalysis<C> {
    /// State before each instruction (`None` for instructions control never reaches)
    states: Vec<Option<InstructionState<C>>>,

    reachable: Vec<bool>,
    branch_targets: Vec<bool>,

    /// Messages of deferred errors, indexed by message id
    error_messages: Vec<String>,

    /// Local variable loaded or stored by each instruction (as an index into `all_local_vars`)
    local_vars: Vec<Option<usize>>,

    /// For each `invokespecial`, the local variables its constructor call initializes
    invokespecial_local_vars: Vec<Option<Vec<Option<usize>>>>,

    all_local_vars: Vec<LocalVar<C>>,
}

impl<C: Copy + Eq> MethodAnalysis<C> {
    /// State right before the instruction executes
    pub fn state(&self, index: usize) -> Option<&InstructionState<C>> {
        self.states.get(index)?.as_ref()
    }

    /// Number of values on the stack before the instruction (wide values count once)
    pub fn stack_height(&self, index: usize) -> Option<usize> {
        self.state(index).map(InstructionState::stack_height)
    }

    /// Type on the stack at some depth (`0` is the top) before the instruction
    ///
    /// Values loaded from local 0 are reported as objects of the class being verified.
    pub fn stack_slot(&self, index: usize, depth: usize) -> Option<VerificationType<C>> {
        self.raw_stack_slot(index, depth)
            .map(VerificationType::unwrap_this)
    }

    /// Like [`MethodAnalysis::stack_slot`], but keeping the `This` pseudo-type
    pub fn raw_stack_slot(&self, index: usize, depth: usize) -> Option<VerificationType<C>> {
        self.state(index)?.stack_slot(depth)
    }

    /// Type of a local variable slot before the instruction
    pub fn local_type(&self, index: usize, local: usize) -> Option<VerificationType<C>> {
        self.state(index)?
            .local(local)
            .map(VerificationType::unwrap_this)
    }

    /// Local variable read or written by the instruction
    pub fn local_var(&self, index: usize) -> Option<&LocalVar<C>> {
        let var = (*self.local_vars.get(index)?)?;
        self.all_local_vars.get(var)
    }

    /// Local variable in the slot which was initialized by an `invokespecial` of a constructor
    pub fn invokespecial_local_var(&self, index: usize, local: usize) -> Option<&LocalVar<C>> {
        let vars = self.invokespecial_local_vars.get(index)?.as_ref()?;
        let var = (*vars.get(local)?)?;
        self.all_local_vars.get(var)
    }

    /// Every distinct local variable in the method
    pub fn all_local_vars(&self) -> &[LocalVar<C>] {
        &self.all_local_vars
    }

    /// Message of a deferred error (see [`crate::jvm::Op::Deferred`])
    pub fn error_message(&self, message_id: usize) -> Option<&str> {
        self.error_messages.get(message_id).map(String::as_str)
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.reachable.get(index).copied().unwrap_or(false)
    }

    /// Is the instruction the target of a branch, switch, exception handler, or subroutine
    /// return?
    pub fn is_branch_target(&self, index: usize) -> bool {
        self.branch_targets.get(index).copied().unwrap_or(false)
    }
}

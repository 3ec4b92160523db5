use thiserror::Error;

/// Everything that can make verification of a method fail outright
#[derive(Debug, Error)]
pub enum Error {
    /// An exception handler range or target is not on instruction boundaries
    #[error("Illegal exception table (class: {class}, method: {method}, signature: {signature})")]
    IllegalExceptionTable {
        class: String,
        method: String,
        signature: String,
    },

    /// The code is not type-safe
    #[error("{kind} (class: {class}, method: {method}, signature: {signature}, offset: {offset}, instruction: {instruction})")]
    Verification {
        kind: VerifyErrorKind,
        class: String,
        method: String,
        signature: String,
        offset: usize,
        instruction: &'static str,
    },

    /// A deferred error, promoted to a failure by the settings
    #[error("{kind}: {message}")]
    DeferredFailure { kind: HardErrorKind, message: String },
}

/// Reasons a method fails to verify
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyErrorKind {
    #[error("Unable to pop operand off an empty stack")]
    EmptyStack,

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Stack size too large")]
    StackSizeTooLarge,

    #[error("Attempt to split long or double on the stack")]
    SplitWideValue,

    #[error("Expecting to find object/array on stack")]
    ExpectedObjectOrArray,

    #[error("Unexpected type {found} where {expected} was expected")]
    UnexpectedType { found: String, expected: String },

    #[error("Expected object reference on stack")]
    ExpectedObjectOnStack,

    #[error("Array reference expected on stack")]
    ExpectedArrayOnStack,

    #[error("Int expected on stack")]
    ExpectedInt,

    #[error("Long expected on stack")]
    ExpectedLong,

    #[error("Float expected on stack")]
    ExpectedFloat,

    #[error("Double expected on stack")]
    ExpectedDouble,

    #[error("Illegal local variable number")]
    IllegalLocal,

    #[error("Invalid local type")]
    InvalidLocalType,

    #[error("incorrect local type, not long")]
    LocalNotLong,

    #[error("incorrect local type, not float")]
    LocalNotFloat,

    #[error("incorrect local type, not double")]
    LocalNotDouble,

    #[error("incorrect local type, not ret")]
    LocalNotRet,

    #[error("Object reference expected")]
    ExpectedObjectReference,

    #[error("Object array expected")]
    ExpectedObjectArray,

    #[error("Byte or boolean array expected")]
    ExpectedByteOrBooleanArray,

    #[error("Inconsistent stack height: {0} != {1}")]
    InconsistentStackHeight(usize, usize),

    #[error("cannot merge {0} and {1}")]
    CannotMerge(String, String),

    #[error("subroutines cannot recurse")]
    RecursiveSubroutine,

    #[error("return from wrong subroutine")]
    WrongSubroutineReturn,

    #[error("inactive subroutine")]
    InactiveSubroutine,

    #[error("Base class constructor wasn't called")]
    BaseConstructorNotCalled,

    #[error("uninitialized object ref in local (2)")]
    UninitializedLocal,

    #[error("uninitialized object ref on stack")]
    UninitializedStack,

    #[error("Illegal target of jump or branch")]
    IllegalBranchTarget,

    #[error("Falling off the end of the code")]
    FallingOffEnd,

    #[error("Illegal constant pool index")]
    IllegalConstantPoolIndex,

    #[error("Illegal type in constant pool")]
    IllegalConstantType,

    #[error("Illegal use of array type")]
    IllegalArrayType,

    #[error("Illegal dimension argument")]
    IllegalDimension,

    #[error("Bad type")]
    BadArrayTypeCode,

    #[error("Wrong return type in function")]
    WrongReturnType,

    #[error("Must call initializers using invokespecial")]
    InitializerNotInvokespecial,

    #[error("Illegal call to internal method")]
    InternalMethodCall,

    #[error("Inconsistent args size")]
    InconsistentArgsSize,

    #[error("Call to wrong initialization method")]
    WrongInitializer,

    #[error("Incompatible object argument for function call")]
    IncompatibleObjectArgument,

    #[error("Incompatible target object for invokespecial")]
    IncompatibleInvokespecialTarget,

    #[error("Invokespecial cannot call subclass methods")]
    InvokespecialSubclassMethod,
}

/// Errors which do not fail verification, but which the instruction must raise when executed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error)]
pub enum HardErrorKind {
    #[error("java.lang.NoClassDefFoundError")]
    NoClassDefFound,

    #[error("java.lang.IllegalAccessError")]
    IllegalAccess,

    #[error("java.lang.InstantiationError")]
    Instantiation,

    #[error("java.lang.IncompatibleClassChangeError")]
    IncompatibleClassChange,

    #[error("java.lang.NoSuchFieldError")]
    NoSuchField,

    #[error("java.lang.NoSuchMethodError")]
    NoSuchMethod,

    #[error("java.lang.AbstractMethodError")]
    AbstractMethod,

    #[error("java.lang.LinkageError")]
    Linkage,
}

use crate::jvm::{BaseType, CoreClass, FieldType, RefType, RenderDescriptor, TypeGraph};
use crate::util::Width;

/// Types tracked on the operand stack and in local variables during verification
///
/// This is the usual hierarchy of [verification types][0], plus some pseudo-types which only
/// the verifier knows about. Pseudo-types never have members.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<C> {
    /// Top of the lattice: a slot holding something that cannot be used
    Invalid,

    Integer,
    Float,
    Long,
    Double,

    /// Result of `float` arithmetic, not yet narrowed to `float` precision
    ExtendedFloat,

    /// Result of `double` arithmetic, not yet narrowed to `double` precision
    ExtendedDouble,

    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Some reference whose class could not be loaded
    Unloadable,

    /// Object or array type
    Object(RefType<C>),

    /// Object created by the `new` at this `pc`, but whose `<init>` has not been called yet
    New { class: C, pc: usize },

    /// Return address pushed by `jsr` into the subroutine starting at this instruction index
    Ret(usize),

    /// Value loaded straight out of local 0 in an instance method
    This(C),
}

impl<C> From<FieldType<C>> for VerificationType<C> {
    fn from(field_type: FieldType<C>) -> Self {
        match field_type {
            FieldType::Base(base_type) if base_type.is_int_like() => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(_) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl<C> Width for VerificationType<C> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Long
            | VerificationType::Double
            | VerificationType::ExtendedDouble => 2,
            _ => 1,
        }
    }
}

impl<C: Copy + Eq> VerificationType<C> {
    pub fn object(class: C) -> Self {
        VerificationType::Object(RefType::Object(class))
    }

    /// Primitive values, including the extended precision ones
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            VerificationType::Integer
                | VerificationType::Float
                | VerificationType::Long
                | VerificationType::Double
                | VerificationType::ExtendedFloat
                | VerificationType::ExtendedDouble
        )
    }

    /// Occupies two stack or local slots
    pub fn is_wide(&self) -> bool {
        self.width() == 2
    }

    pub fn is_new(&self) -> bool {
        matches!(self, VerificationType::New { .. })
    }

    /// Strip off the knowledge that a value came from local 0
    pub fn unwrap_this(self) -> Self {
        match self {
            VerificationType::This(class) => VerificationType::object(class),
            other => other,
        }
    }

    /// Forget about extended precision
    pub fn nominal(self) -> Self {
        match self {
            VerificationType::ExtendedFloat => VerificationType::Float,
            VerificationType::ExtendedDouble => VerificationType::Double,
            other => other,
        }
    }

    pub fn is_unloadable<G: TypeGraph<Class = C>>(&self, graph: &G) -> bool {
        match self {
            VerificationType::Unloadable => true,
            VerificationType::Object(ref_type) => graph.is_type_unloadable(ref_type),
            _ => false,
        }
    }

    pub fn is_null_or_unloadable<G: TypeGraph<Class = C>>(&self, graph: &G) -> bool {
        *self == VerificationType::Null || self.is_unloadable(graph)
    }

    /// Interfaces and arrays of interfaces, which the verifier treats like `java.lang.Object`
    pub fn is_interface_or_interface_array<G: TypeGraph<Class = C>>(&self, graph: &G) -> bool {
        match self {
            VerificationType::Object(ref_type) => match ref_type.element_class() {
                Some(class) => !graph.is_unloadable(*class) && graph.is_interface(*class),
                None => false,
            },
            _ => false,
        }
    }

    /// Number of array dimensions (0 for anything that isn't an array)
    pub fn array_rank(&self) -> usize {
        match self {
            VerificationType::Object(ref_type) => ref_type.dimensions(),
            _ => 0,
        }
    }

    /// Reference type, for object and array types
    pub fn ref_type(&self) -> Option<&RefType<C>> {
        match self {
            VerificationType::Object(ref_type) => Some(ref_type),
            _ => None,
        }
    }

    /// Is the type assignable to the reference type? Pseudo-types never are.
    pub fn is_assignable_to<G: TypeGraph<Class = C>>(
        &self,
        super_type: &RefType<C>,
        graph: &G,
    ) -> bool {
        match self.unwrap_this() {
            VerificationType::Object(ref_type) => graph.is_assignable(&ref_type, super_type),
            _ => false,
        }
    }

    /// Is this a reference to the class or one of its subclasses?
    ///
    /// Arrays are only subclasses of `java.lang.Object`.
    pub fn is_subclass_of<G: TypeGraph<Class = C>>(&self, class: C, graph: &G) -> bool {
        match self.unwrap_this() {
            VerificationType::Object(RefType::Object(sub_class)) => {
                graph.is_subclass(sub_class, class)
            }
            VerificationType::Object(_) => class == graph.core_class(CoreClass::Object),
            _ => false,
        }
    }

    /// Least upper bound of two types, or `Invalid` if there is none
    pub fn join<G: TypeGraph<Class = C>>(&self, other: &Self, graph: &G) -> Self {
        use VerificationType::*;

        match (*self, *other) {
            (t1, t2) if t1 == t2 => return t1,
            (Null, t) | (t, Null) => return t,
            (ExtendedFloat, Float) | (Float, ExtendedFloat) => return ExtendedFloat,
            (ExtendedDouble, Double) | (Double, ExtendedDouble) => return ExtendedDouble,
            _ => (),
        }

        let opaque = |t: &Self| {
            t.is_primitive()
                || matches!(t, Invalid | UninitializedThis | New { .. } | Ret(_))
        };
        if opaque(self) || opaque(other) {
            return Invalid;
        }

        let (t1, t2) = (self.unwrap_this(), other.unwrap_this());
        if t1.is_unloadable(graph) || t2.is_unloadable(graph) {
            return Unloadable;
        }
        match (t1, t2) {
            (Object(r1), Object(r2)) => Object(join_ref_types(&r1, &r2, graph)),
            _ => Invalid,
        }
    }

    /// Name used in error messages
    pub fn display<G: TypeGraph<Class = C>>(&self, graph: &G) -> String {
        use VerificationType::*;

        match self {
            Invalid => String::from("<invalid>"),
            Integer => String::from("int"),
            Float => String::from("float"),
            Long => String::from("long"),
            Double => String::from("double"),
            ExtendedFloat => String::from("<extfloat>"),
            ExtendedDouble => String::from("<extdouble>"),
            Null => String::from("null"),
            UninitializedThis => String::from("uninitialized-this"),
            Unloadable => String::from("<unloadable>"),
            New { .. } => String::from("new"),
            Ret(_) => String::from("ret"),
            This(_) => String::from("this"),
            Object(ref_type) => ref_type_name(ref_type, graph),
        }
    }
}

/// Java name of a reference type (`java.lang.String`, `[I`, `[[Ljava.lang.String;`)
pub fn ref_type_name<G: TypeGraph>(ref_type: &RefType<G::Class>, graph: &G) -> String {
    match ref_type {
        RefType::Object(class) => graph.java_name(*class),
        RefType::ObjectArray(arr) => format!(
            "{}L{};",
            "[".repeat(arr.dimensions()),
            graph.java_name(arr.element_type)
        ),
        RefType::PrimitiveArray(arr) => {
            let mut name = "[".repeat(arr.dimensions());
            arr.element_type.render_to(&mut name);
            name
        }
    }
}

/// Least upper bound of two loadable reference types
fn join_ref_types<G: TypeGraph>(
    r1: &RefType<G::Class>,
    r2: &RefType<G::Class>,
    graph: &G,
) -> RefType<G::Class> {
    let object = RefType::Object(graph.core_class(CoreClass::Object));
    if !(r1.is_array() && r2.is_array()) {
        return join_non_arrays(r1, r2, graph);
    }

    // Peel off dimensions both arrays have
    let mut rank = 1;
    let (mut elem1, mut elem2) = (r1.component_type(), r2.component_type());
    while let (Some(FieldType::Ref(e1)), Some(FieldType::Ref(e2))) = (elem1, elem2) {
        if !(e1.is_array() && e2.is_array()) {
            break;
        }
        rank += 1;
        elem1 = e1.component_type();
        elem2 = e2.component_type();
    }

    let (base, rank) = match (elem1, elem2) {
        (Some(FieldType::Ref(e1)), Some(FieldType::Ref(e2))) => {
            (join_non_arrays(&e1, &e2, graph), rank)
        }
        _ => (object, rank - 1),
    };
    (0..rank).fold(base, |acc, _| RefType::array(FieldType::Ref(acc)))
}

/// Least upper bound where at most one side is an array
fn join_non_arrays<G: TypeGraph>(
    r1: &RefType<G::Class>,
    r2: &RefType<G::Class>,
    graph: &G,
) -> RefType<G::Class> {
    let object = graph.core_class(CoreClass::Object);
    if r1 == r2 {
        return *r1;
    }
    let (class1, class2) = match (r1, r2) {
        (RefType::Object(c1), RefType::Object(c2)) => (*c1, *c2),
        _ => return RefType::Object(object),
    };
    if graph.is_interface(class1) || graph.is_interface(class2) {
        return RefType::Object(object);
    }

    // The first superclass of `class2` which is also a superclass of `class1`
    let mut next_class = Some(class2);
    while let Some(class) = next_class {
        if graph.is_subclass(class1, class) {
            return RefType::Object(class);
        }
        next_class = graph.superclass(class);
    }
    RefType::Object(object)
}

/// Widen a base type the way loads from arrays and fields do
pub fn widen<C>(base_type: BaseType) -> VerificationType<C> {
    VerificationType::from(FieldType::Base(base_type))
}

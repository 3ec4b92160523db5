//! In-memory class hierarchy
//!
//! Classes and their members are arena-allocated and referenced by address (see [`RefId`]), so
//! the graph can grow while handles into it are held. This is the [`TypeGraph`] implementation
//! used for tests and for callers which have already parsed every class they care about.

use super::{
    BinaryName, ClassAccessFlags, CoreClass, FieldAccessFlags, FieldRef, FieldType,
    MethodAccessFlags, MethodDescriptor, MethodRef, Name, ParseDescriptor, RefType, RenderDescriptor,
    ResolvedField, ResolvedMethod, TypeGraph, UnqualifiedName,
};
use crate::util::RefId;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::fmt;
use std::fmt::Debug;
use std::io::Result;
use typed_arena::Arena;

mod assignable;
mod java_classes;

pub use assignable::*;
pub use java_classes::*;

pub type ClassId<'g> = RefId<'g, ClassData<'g>>;
pub type FieldId<'g> = RefId<'g, FieldData<'g>>;
pub type MethodId<'g> = RefId<'g, MethodData<'g>>;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Tracks the relationships between classes/interfaces and the members on those classes
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<BinaryName, Box<ClassId<'g>>>,

    /// The handful of `java.*` classes every graph starts out with
    pub java: JavaClasses<'g>,
}

/// Allocate a class and register it by name
fn register_class<'g>(
    arenas: &'g ClassGraphArenas<'g>,
    classes: &FrozenMap<BinaryName, Box<ClassId<'g>>>,
    data: ClassData<'g>,
) -> ClassId<'g> {
    let class = RefId(&*arenas.class_arena.alloc(data));
    classes.insert(class.name.clone(), Box::new(class));
    class
}

impl<'g> ClassGraph<'g> {
    /// New graph, containing only the standard library types
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        let classes = FrozenMap::new();
        let java = JavaClasses::allocate(|data| register_class(arenas, &classes, data));
        ClassGraph {
            arenas,
            classes,
            java,
        }
    }

    pub fn lookup_class(&self, name: &BinaryName) -> Option<ClassId<'g>> {
        self.classes.get(name).copied()
    }

    /// Add a new class to the class graph
    pub fn add_class(&self, data: ClassData<'g>) -> ClassId<'g> {
        register_class(self.arenas, &self.classes, data)
    }

    /// Get the class with this name, or record that it could not be loaded
    pub fn add_unloadable(&self, name: BinaryName) -> ClassId<'g> {
        match self.lookup_class(&name) {
            Some(class) => class,
            None => self.add_class(ClassData::unloadable(name)),
        }
    }

    /// Add a field to the class graph and to its class
    pub fn add_field(&self, field: FieldData<'g>) -> FieldId<'g> {
        let field = RefId(&*self.arenas.field_arena.alloc(field));
        field.class.fields.push(field);
        field
    }

    /// Add a method to the class graph and to its class
    pub fn add_method(&self, method: MethodData<'g>) -> MethodId<'g> {
        let method = RefId(&*self.arenas.method_arena.alloc(method));
        method.class.methods.push(method);
        method
    }

    /// Parse a field descriptor, treating classes missing from the graph as unloadable
    pub fn parse_field_type(&self, descriptor: &str) -> Result<FieldType<ClassId<'g>>> {
        let field_type = FieldType::<BinaryName>::parse(descriptor)?;
        Ok(field_type.map(|name| self.add_unloadable(name.clone())))
    }

    /// Parse a method descriptor, treating classes missing from the graph as unloadable
    pub fn parse_method_descriptor(
        &self,
        descriptor: &str,
    ) -> Result<MethodDescriptor<ClassId<'g>>> {
        let descriptor = MethodDescriptor::<BinaryName>::parse(descriptor)?;
        Ok(descriptor.map(|name| self.add_unloadable(name.clone())))
    }

    /// Resolve a field, as in JVMS 5.4.3.2: the class itself, then its super interfaces, then
    /// its superclass
    pub fn resolve_field(
        &self,
        class: ClassId<'g>,
        name: &UnqualifiedName,
        descriptor: &FieldType<ClassId<'g>>,
    ) -> Option<ResolvedField<ClassId<'g>>> {
        let declared = class
            .fields
            .iter()
            .find(|field| &field.name == name && &field.descriptor == descriptor);
        if let Some(field) = declared {
            return Some(ResolvedField {
                class: field.class,
                field_type: field.descriptor,
                access_flags: field.access_flags,
            });
        }
        class
            .interfaces
            .iter()
            .chain(class.superclass.iter())
            .find_map(|super_type| self.resolve_field(*super_type, name, descriptor))
    }

    /// Resolve a method, as in JVMS 5.4.3.3: the class and its superclasses, then super
    /// interfaces. Methods on arrays resolve against `java.lang.Object`.
    pub fn resolve_method(
        &self,
        class: &RefType<ClassId<'g>>,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<ClassId<'g>>,
    ) -> Option<ResolvedMethod<ClassId<'g>>> {
        let class = match class {
            RefType::Object(class) => *class,
            RefType::ObjectArray(_) | RefType::PrimitiveArray(_) => self.java.object,
        };

        let mut next_class = Some(class);
        while let Some(class) = next_class {
            if let Some(method) = Self::declared_method(class, name, descriptor) {
                return Some(method);
            }
            next_class = class.superclass;
        }

        let mut to_visit: Vec<ClassId<'g>> = class.interfaces.clone();
        while let Some(interface) = to_visit.pop() {
            if let Some(method) = Self::declared_method(interface, name, descriptor) {
                return Some(method);
            }
            to_visit.extend(interface.interfaces.iter().copied());
        }
        None
    }

    fn declared_method(
        class: ClassId<'g>,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<ClassId<'g>>,
    ) -> Option<ResolvedMethod<ClassId<'g>>> {
        class
            .methods
            .iter()
            .find(|method| &method.name == name && &method.descriptor == descriptor)
            .map(|method| ResolvedMethod {
                class: method.class,
                descriptor: method.descriptor.clone(),
                access_flags: method.access_flags,
            })
    }

    /// Build a constant pool field reference, resolved against the graph
    pub fn field_ref(
        &self,
        class: ClassId<'g>,
        name: UnqualifiedName,
        descriptor: FieldType<ClassId<'g>>,
    ) -> FieldRef<ClassId<'g>> {
        let resolved = if class.unloadable {
            None
        } else {
            self.resolve_field(class, &name, &descriptor)
        };
        FieldRef {
            class,
            name,
            descriptor,
            resolved,
        }
    }

    /// Build a constant pool method reference, resolved against the graph
    pub fn method_ref(
        &self,
        class: RefType<ClassId<'g>>,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<ClassId<'g>>,
    ) -> MethodRef<ClassId<'g>> {
        let resolved = if self.is_type_unloadable(&class) {
            None
        } else {
            self.resolve_method(&class, &name, &descriptor)
        };
        MethodRef {
            class,
            name,
            descriptor,
            resolved,
        }
    }
}

impl<'g> TypeGraph for ClassGraph<'g> {
    type Class = ClassId<'g>;

    fn core_class(&self, class: CoreClass) -> ClassId<'g> {
        match class {
            CoreClass::Object => self.java.object,
            CoreClass::Throwable => self.java.throwable,
            CoreClass::String => self.java.string,
            CoreClass::Class => self.java.class,
            CoreClass::Cloneable => self.java.cloneable,
            CoreClass::Serializable => self.java.serializable,
        }
    }

    fn class_name(&self, class: ClassId<'g>) -> BinaryName {
        class.name.clone()
    }

    fn superclass(&self, class: ClassId<'g>) -> Option<ClassId<'g>> {
        class.superclass
    }

    fn is_interface(&self, class: ClassId<'g>) -> bool {
        class.is_interface()
    }

    fn is_abstract(&self, class: ClassId<'g>) -> bool {
        class.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    fn is_public(&self, class: ClassId<'g>) -> bool {
        class.access_flags.contains(ClassAccessFlags::PUBLIC)
    }

    fn is_unloadable(&self, class: ClassId<'g>) -> bool {
        class.unloadable
    }

    fn is_assignable(&self, sub_type: &RefType<ClassId<'g>>, super_type: &RefType<ClassId<'g>>) -> bool {
        sub_type.is_assignable(super_type)
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself (and unloadable classes)
    pub superclass: Option<ClassId<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<ClassId<'g>>,

    pub access_flags: ClassAccessFlags,

    /// Placeholder for a class which could not be found
    pub unloadable: bool,

    pub methods: FrozenVec<MethodId<'g>>,

    pub fields: FrozenVec<FieldId<'g>>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: ClassId<'g>,
        access_flags: ClassAccessFlags,
        interfaces: Vec<ClassId<'g>>,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces,
            access_flags,
            unloadable: false,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        }
    }

    pub fn unloadable(name: BinaryName) -> ClassData<'g> {
        ClassData {
            name,
            superclass: None,
            interfaces: vec![],
            access_flags: ClassAccessFlags::PUBLIC,
            unloadable: true,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}

impl<'g> RenderDescriptor for ClassData<'g> {
    fn render_to(&self, write_to: &mut String) {
        self.name.render_to(write_to)
    }
}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

pub struct MethodData<'g> {
    /// Class declaring the method
    pub class: ClassId<'g>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<ClassId<'g>>,
    pub access_flags: MethodAccessFlags,
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        )
    }
}

pub struct FieldData<'g> {
    /// Class declaring the field
    pub class: ClassId<'g>,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<ClassId<'g>>,
    pub access_flags: FieldAccessFlags,
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    #[test]
    fn member_resolution_walks_superclasses() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let base = graph.add_class(ClassData::new(
            BinaryName::from_string(String::from("shapes/Shape")).unwrap(),
            graph.java.object,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
            vec![],
        ));
        let square = graph.add_class(ClassData::new(
            BinaryName::from_string(String::from("shapes/Square")).unwrap(),
            base,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        let side = UnqualifiedName::from_string(String::from("side")).unwrap();
        graph.add_field(FieldData {
            class: base,
            name: side.clone(),
            descriptor: FieldType::int(),
            access_flags: FieldAccessFlags::PROTECTED,
        });
        let area_desc = graph.parse_method_descriptor("()D").unwrap();
        let area = UnqualifiedName::from_string(String::from("area")).unwrap();
        graph.add_method(MethodData {
            class: base,
            name: area.clone(),
            descriptor: area_desc.clone(),
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        });

        let field = graph.field_ref(square, side.clone(), FieldType::int());
        assert_eq!(field.resolved.map(|f| f.class), Some(base));
        let missing = graph.field_ref(square, side, FieldType::long());
        assert_eq!(missing.resolved, None);

        let method = graph.method_ref(RefType::Object(square), area, area_desc);
        assert_eq!(method.resolved.map(|m| m.class), Some(base));
    }

    #[test]
    fn descriptors_mention_unknown_classes() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);

        let desc = graph
            .parse_method_descriptor("(Ljava/lang/String;Lgone/Missing;)V")
            .unwrap();
        assert_eq!(desc.parameters[0], FieldType::object(graph.java.string));
        match desc.parameters[1] {
            FieldType::Ref(RefType::Object(class)) => assert!(graph.is_unloadable(class)),
            other => panic!("unexpected parameter {:?}", other),
        }
        assert!(graph.lookup_class(&BinaryName::OBJECT).is_some());
    }
}

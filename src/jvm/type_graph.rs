use super::{BinaryName, Name, RefType};
use std::fmt::Debug;
use std::hash::Hash;

/// Classes the verifier needs to refer to by name
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CoreClass {
    Object,
    Throwable,
    String,
    Class,
    Cloneable,
    Serializable,
}

/// View of the class hierarchy used during verification
///
/// The verifier never loads anything: classes which the graph could not load are reported as
/// unloadable, and the verifier works around them (or defers an error to runtime).
pub trait TypeGraph {
    /// Handle to a class or interface
    type Class: Copy + Eq + Hash + Debug;

    fn core_class(&self, class: CoreClass) -> Self::Class;

    fn class_name(&self, class: Self::Class) -> BinaryName;

    /// Superclass (`None` for `java/lang/Object` and for unloadable classes)
    fn superclass(&self, class: Self::Class) -> Option<Self::Class>;

    fn is_interface(&self, class: Self::Class) -> bool;

    fn is_abstract(&self, class: Self::Class) -> bool;

    fn is_public(&self, class: Self::Class) -> bool;

    /// Could the class not be loaded?
    fn is_unloadable(&self, class: Self::Class) -> bool;

    /// Is the first reference type assignable to the second?
    fn is_assignable(&self, sub_type: &RefType<Self::Class>, super_type: &RefType<Self::Class>)
        -> bool;

    /// Is the first class the same as, or a transitive superclass of, the second?
    ///
    /// Interfaces are not followed.
    fn is_subclass(&self, sub_class: Self::Class, super_class: Self::Class) -> bool {
        let mut next_class = Some(sub_class);
        while let Some(class) = next_class {
            if class == super_class {
                return true;
            }
            next_class = self.superclass(class);
        }
        false
    }

    fn in_same_package(&self, class1: Self::Class, class2: Self::Class) -> bool {
        class1 == class2 || self.class_name(class1).package() == self.class_name(class2).package()
    }

    /// Can code in `from` refer to `class`?
    fn is_class_accessible(&self, class: Self::Class, from: Self::Class) -> bool {
        self.is_public(class) || self.in_same_package(class, from)
    }

    /// Can code in `from` refer to the type? Primitive arrays are always accessible.
    fn is_type_accessible(&self, ref_type: &RefType<Self::Class>, from: Self::Class) -> bool {
        match ref_type.element_class() {
            Some(class) => self.is_class_accessible(*class, from),
            None => true,
        }
    }

    /// Is the reference type (or its element type for arrays) unloadable?
    fn is_type_unloadable(&self, ref_type: &RefType<Self::Class>) -> bool {
        match ref_type.element_class() {
            Some(class) => self.is_unloadable(*class),
            None => false,
        }
    }

    /// Java source name of a class (`java.lang.Object`)
    fn java_name(&self, class: Self::Class) -> String {
        self.class_name(class).to_java_name()
    }

    /// Name of a class exactly as it appears in the class file
    fn binary_name(&self, class: Self::Class) -> String {
        self.class_name(class).as_str().to_owned()
    }
}

use super::ClassId;
use crate::jvm::{BinaryName, RefType};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// This does a traversal of super types in the class graph to determine assignability
///
/// Unloadable classes have no known super types, so they are only assignable to themselves.
impl<'g> Assignable for ClassId<'g> {
    fn is_assignable(&self, super_type: &ClassId<'g>) -> bool {
        let mut to_visit: Vec<ClassId<'g>> = vec![*self];
        let mut seen: HashSet<ClassId<'g>> = HashSet::new();
        seen.insert(*self);

        // Interfaces can only be reached through other interfaces
        let super_is_class: bool = !super_type.is_interface();

        while let Some(class) = to_visit.pop() {
            if class == *super_type {
                return true;
            }

            let supertypes = class.superclass.iter();
            let interfaces = if super_is_class {
                [].iter()
            } else {
                class.interfaces.iter()
            };
            for next in supertypes.chain(interfaces) {
                if seen.insert(*next) {
                    to_visit.push(*next);
                }
            }
        }

        false
    }
}

/// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)` in
/// JVMS §4.10.1.2.
impl<'g> Assignable for RefType<ClassId<'g>> {
    fn is_assignable(&self, super_type: &RefType<ClassId<'g>>) -> bool {
        match (self, super_type) {
            // Arrays are objects, cloneable, and serializable
            (RefType::PrimitiveArray(_) | RefType::ObjectArray(_), RefType::Object(class)) => {
                is_array_supertype(&class.name)
            }

            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // `int[][]` is an `Object[]`, but `int[]` is not
            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less | Ordering::Equal => false,
                    Ordering::Greater => is_array_supertype(&arr2.element_type.name),
                }
            }

            // Arrays are covariant
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => arr1.element_type.is_assignable(&arr2.element_type),
                    Ordering::Greater => is_array_supertype(&arr2.element_type.name),
                }
            }

            (RefType::Object(cls1), RefType::Object(cls2)) => cls1.is_assignable(cls2),

            _ => false,
        }
    }
}

/// The small, finite set of super types arrays have
fn is_array_supertype(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{Assignable, ClassData, ClassGraph, ClassGraphArenas};
    use crate::jvm::{BinaryName, ClassAccessFlags, FieldType, Name, RefType};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    #[test]
    fn classes_and_interfaces() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let java = &graph.java;

        let pet = graph.add_class(ClassData::new(
            name("zoo/Pet"),
            java.object,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            vec![],
        ));
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
            vec![pet],
        ));

        assert!(dog.is_assignable(&animal), "zoo.Dog <: zoo.Animal");
        assert!(dog.is_assignable(&java.object), "zoo.Dog <: java.lang.Object");
        assert!(dog.is_assignable(&pet), "zoo.Dog <: zoo.Pet");
        assert!(pet.is_assignable(&java.object), "zoo.Pet <: java.lang.Object");
        assert!(!animal.is_assignable(&dog), "zoo.Animal </: zoo.Dog");
        assert!(!animal.is_assignable(&pet), "zoo.Animal </: zoo.Pet");
        assert!(
            java.string.is_assignable(&java.serializable),
            "java.lang.String <: java.io.Serializable"
        );
    }

    #[test]
    fn unloadable_classes() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let missing = graph.add_unloadable(name("gone/Missing"));

        assert!(missing.is_assignable(&missing));
        assert!(!missing.is_assignable(&graph.java.object));
        assert_eq!(graph.add_unloadable(name("gone/Missing")), missing);
    }

    #[test]
    fn arrays() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let java = &graph.java;

        let object = &RefType::Object(java.object);
        let cloneable = &RefType::Object(java.cloneable);
        let int_array = &RefType::array(FieldType::int());
        let long_array = &RefType::array(FieldType::long());
        let object_array = &RefType::array(FieldType::object(java.object));
        let integer_array = &RefType::array(FieldType::object(java.integer));
        let number_array = &RefType::array(FieldType::object(java.number));
        let nested_int_array = &RefType::array(FieldType::array(FieldType::int()));

        assert!(int_array.is_assignable(object), "int[] <: java.lang.Object");
        assert!(int_array.is_assignable(cloneable), "int[] <: java.lang.Cloneable");
        assert!(!object.is_assignable(int_array), "java.lang.Object </: int[]");
        assert!(!int_array.is_assignable(long_array), "int[] </: long[]");
        assert!(!int_array.is_assignable(object_array), "int[] </: java.lang.Object[]");
        assert!(
            nested_int_array.is_assignable(object_array),
            "int[][] <: java.lang.Object[]"
        );
        assert!(
            integer_array.is_assignable(number_array),
            "java.lang.Integer[] <: java.lang.Number[]"
        );
        assert!(
            !number_array.is_assignable(integer_array),
            "java.lang.Number[] </: java.lang.Integer[]"
        );
    }
}

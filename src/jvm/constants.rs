use super::{
    FieldAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, RefType, UnqualifiedName,
    VerifyErrorKind,
};
use crate::util::{Offset, OffsetResult, OffsetVec, Width};

/// Constant pool of the class being verified
///
/// Member references arrive already resolved (or not) against the type graph: resolution is the
/// job of whoever loads the class, the verifier only checks what it gets.
#[derive(Debug)]
pub struct ConstantPool<C> {
    constants: OffsetVec<Constant<C>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Constant<C> {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<C>),
    FieldRef(FieldRef<C>),
    MethodRef(MethodRef<C>),
    InterfaceMethodRef(MethodRef<C>),

    /// Entries the verifier never looks inside (`Utf8`, `NameAndType`, `MethodHandle`, etc.)
    Other,
}

impl<C> Width for Constant<C> {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Symbolic reference to a field
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRef<C> {
    pub class: C,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<C>,

    /// Field found by resolving the reference, if resolution succeeded
    pub resolved: Option<ResolvedField<C>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedField<C> {
    /// Class declaring the field (may be a superclass of the referenced class)
    pub class: C,
    pub field_type: FieldType<C>,
    pub access_flags: FieldAccessFlags,
}

/// Symbolic reference to a method
///
/// The class is a full reference type since methods can be invoked on arrays (eg. `clone`).
#[derive(Clone, Debug, PartialEq)]
pub struct MethodRef<C> {
    pub class: RefType<C>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<C>,

    /// Method found by resolving the reference, if resolution succeeded
    pub resolved: Option<ResolvedMethod<C>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedMethod<C> {
    /// Class declaring the method (may be a superclass of the referenced class)
    pub class: C,
    pub descriptor: MethodDescriptor<C>,
    pub access_flags: MethodAccessFlags,
}

impl<C> ConstantPool<C> {
    pub fn new() -> ConstantPool<C> {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
        }
    }

    /// Add a constant, returning its index
    pub fn push(&mut self, constant: Constant<C>) -> u16 {
        self.constants.push(constant).0 as u16
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn get(&self, index: u16) -> Result<&Constant<C>, VerifyErrorKind> {
        match self.constants.get_offset(Offset(index as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            OffsetResult::InvalidOffset(_) | OffsetResult::OutOfBounds => {
                Err(VerifyErrorKind::IllegalConstantPoolIndex)
            }
        }
    }

    pub fn class(&self, index: u16) -> Result<&RefType<C>, VerifyErrorKind> {
        match self.get(index)? {
            Constant::Class(class) => Ok(class),
            _ => Err(VerifyErrorKind::IllegalConstantPoolIndex),
        }
    }

    pub fn field_ref(&self, index: u16) -> Result<&FieldRef<C>, VerifyErrorKind> {
        match self.get(index)? {
            Constant::FieldRef(field) => Ok(field),
            _ => Err(VerifyErrorKind::IllegalConstantPoolIndex),
        }
    }

    /// Method reference, along with whether it is an interface method reference
    pub fn method_ref(&self, index: u16) -> Result<(&MethodRef<C>, bool), VerifyErrorKind> {
        match self.get(index)? {
            Constant::MethodRef(method) => Ok((method, false)),
            Constant::InterfaceMethodRef(method) => Ok((method, true)),
            _ => Err(VerifyErrorKind::IllegalConstantPoolIndex),
        }
    }
}

impl<C> Default for ConstantPool<C> {
    fn default() -> Self {
        ConstantPool::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::BinaryName;

    #[test]
    fn indices_account_for_wide_constants() {
        let mut pool: ConstantPool<BinaryName> = ConstantPool::new();
        assert_eq!(pool.push(Constant::Integer(1)), 1);
        assert_eq!(pool.push(Constant::Long(2)), 2);
        assert_eq!(pool.push(Constant::Class(RefType::Object(BinaryName::STRING))), 4);
        assert_eq!(pool.len(), 3);

        assert_eq!(pool.get(2), Ok(&Constant::Long(2)));
        assert_eq!(pool.get(3), Err(VerifyErrorKind::IllegalConstantPoolIndex));
        assert_eq!(pool.get(0), Err(VerifyErrorKind::IllegalConstantPoolIndex));
        assert_eq!(pool.class(4), Ok(&RefType::Object(BinaryName::STRING)));
        assert_eq!(pool.class(1), Err(VerifyErrorKind::IllegalConstantPoolIndex));
        assert!(pool.field_ref(4).is_err());
        assert!(pool.method_ref(7).is_err());
    }
}

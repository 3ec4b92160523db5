use super::types::VerificationType;
use crate::jvm::{MemberAccessFlags, RefType, TypeGraph, Visibility};

/// Can code in `caller` access a member declared in `declaring`?
///
/// The member was referenced through `referenced`, which must itself be accessible. For
/// protected instance members, `instance` is the type of the object the member is accessed on
/// (`None` if it isn't known): outside of the package, it must be the caller or a subclass.
pub(super) fn is_member_accessible<G: TypeGraph>(
    graph: &G,
    access_flags: impl MemberAccessFlags,
    declaring: G::Class,
    referenced: &RefType<G::Class>,
    caller: G::Class,
    instance: Option<VerificationType<G::Class>>,
) -> bool {
    if !graph.is_type_accessible(referenced, caller) {
        return false;
    }

    match access_flags.visibility() {
        Visibility::Public => true,
        Visibility::Private => declaring == caller,
        Visibility::Package => graph.in_same_package(declaring, caller),
        Visibility::Protected => {
            graph.in_same_package(declaring, caller)
                || graph.is_subclass(caller, declaring)
                    && (access_flags.is_static()
                        || instance.map_or(true, |instance| {
                            instance.is_null_or_unloadable(graph)
                                || instance.is_subclass_of(caller, graph)
                        }))
        }
    }
}

use crate::ResolveError;

/// The container identifier encoded in a question name: everything before the first `.`.
///
/// Names reach us fully qualified, so `web.` yields `web` while the root name `.` yields an
/// empty identifier, which no container will match. The rest of the name is ignored.
pub fn container_id(name: &str) -> Result<&str, ResolveError> {
    match name.find('.') {
        Some(firstdot) => Ok(&name[..firstdot]),
        None => Err(ResolveError::InvalidName(name.to_string())),
    }
}

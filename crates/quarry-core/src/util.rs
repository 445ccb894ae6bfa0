//! Small shared helpers.

/// Validate list pagination parameters.
///
/// `limit = -1` means "all items"; `limit = 0` is a valid empty page.
/// Anything below -1, or a negative offset, is a caller bug.
pub fn check_list_params(limit: i64, offset: i64) -> Result<(), String> {
    if limit < -1 {
        return Err(format!("limit of {limit} is out of bounds"));
    }
    if offset < 0 {
        return Err(format!("offset of {offset} is out of bounds"));
    }
    Ok(())
}

/// Apply pagination to a slice, returning the selected window.
///
/// Offsets past the end return an empty window, not an error.
pub fn paginate<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    let start = (offset as usize).min(items.len());
    let end = if limit < 0 {
        items.len()
    } else {
        (start + limit as usize).min(items.len())
    };
    items[start..end].to_vec()
}

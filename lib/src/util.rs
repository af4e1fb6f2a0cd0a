/// Elements with a width, measured in JVM slots
///
/// `long` and `double` values take up two slots on the stack and in the locals, everything else
/// takes up one.
pub trait Width {
    fn width(&self) -> usize;
}

/// Append an element to an ordered list unless it is already present
///
/// Returns whether the list changed.
pub fn push_unique<T: PartialEq>(list: &mut Vec<T>, elem: T) -> bool {
    if list.contains(&elem) {
        false
    } else {
        list.push(elem);
        true
    }
}

/// Three-state update for an optional field in a partial patch.
///
/// - `NoChange`: keep the existing value
/// - `Set(value)`: replace it
/// - `Clear`: set it to `None`
///
/// ```
/// use kanban_domain::FieldUpdate;
///
/// let mut description = Some("draft".to_string());
/// FieldUpdate::Set("final".to_string()).apply_to(&mut description);
/// assert_eq!(description.as_deref(), Some("final"));
///
/// FieldUpdate::<String>::Clear.apply_to(&mut description);
/// assert_eq!(description, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    NoChange,
    Set(T),
    Clear,
}

impl<T: PartialEq> FieldUpdate<T> {
    /// Apply to `field`. Returns whether the stored value actually changed.
    pub fn apply_to(self, field: &mut Option<T>) -> bool {
        match self {
            FieldUpdate::NoChange => false,
            FieldUpdate::Set(value) => {
                if field.as_ref() == Some(&value) {
                    false
                } else {
                    *field = Some(value);
                    true
                }
            }
            FieldUpdate::Clear => field.take().is_some(),
        }
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    /// `Some` becomes `Set`, `None` becomes `Clear`.
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(value) => FieldUpdate::Set(value),
            None => FieldUpdate::Clear,
        }
    }
}

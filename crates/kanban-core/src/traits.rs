/// An entity kept in a dense, zero-based ordered sequence.
///
/// Implemented by cards (ordered within a board) and boards (ordered within an
/// environment). Ordered collections rewrite `position` from the array index
/// after every structural change.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> i32;
    fn set_position(&mut self, position: i32);
}

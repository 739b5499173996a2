pub(super) mod button;
pub(super) mod display;
pub(super) mod sensors;

pub mod add_rls;
pub mod apply;
pub mod check;

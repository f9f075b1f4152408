pub mod rointe;

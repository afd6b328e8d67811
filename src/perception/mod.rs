pub mod locator;
pub mod ocr;
pub mod pointer;
pub mod screenshot;
pub mod types;

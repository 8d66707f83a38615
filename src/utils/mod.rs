pub mod line_editor;
pub mod logging;
pub mod shell;
pub mod url;
#[cfg(test)]
pub mod test_utils;

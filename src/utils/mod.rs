pub mod command;
pub mod db;
pub mod external_tools;
pub mod fastx;
pub mod file;
pub mod mash;
pub mod sambam;
pub mod system;

pub mod db;
pub mod plassembler;

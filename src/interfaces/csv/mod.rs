pub mod availability_writer;
pub mod booking_reader;

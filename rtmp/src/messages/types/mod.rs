pub mod abort;
pub mod amf0_command;
pub mod amf0_data;
pub mod bytes_read;
pub mod client_bandwidth;
pub mod flv_tags;
pub mod server_bandwidth;
pub mod set_chunk_size;
pub mod user_control;

/*!
 * Network Handles
 * Socket descriptor owners
 */

mod socket;

pub use socket::SocketDescriptor;

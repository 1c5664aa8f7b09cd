// Licensed under the Apache-2.0 license

//! AXI GPIO block wired to the capability parser's result counters.

pub const AXIGPIO_SIZE: usize = 0x10;

pub mod regs {
    /// Channel 1 data: number of capability indexes the parser consumed.
    pub const TOTAL_KCAP_COUNT: usize = 0x00;
    pub const GPIO_TRI: usize = 0x04;
    /// Channel 2 data: number of valid capability indexes found.
    pub const VALID_KCAP_COUNT: usize = 0x08;
    pub const GPIO2_TRI: usize = 0x0c;
}

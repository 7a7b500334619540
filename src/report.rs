//! Result rendering.
//!
//! Produces the single line printed for a replayed call. Success and failure lines differ only in
//! text: a failed simulated call is still a successful run of the tool.
use std::collections::HashMap;

use alloy_primitives::U256;
use alloy_sol_types::SolValue;
use lazy_static::lazy_static;

use crate::evm::simulation::{CallResult, SimulationFailure, SimulationResult};

/// Selector of the Solidity `Error(string)` revert payload.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of the Solidity `Panic(uint256)` revert payload.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

lazy_static! {
    static ref SOLIDITY_PANIC_CODES: HashMap<u64, &'static str> = HashMap::from([
        (0x00, "generic compiler panic"),
        (0x01, "assertion failed"),
        (0x11, "arithmetic overflow or underflow"),
        (0x12, "division or modulo by zero"),
        (0x21, "invalid enum value"),
        (0x22, "invalid storage byte array encoding"),
        (0x31, "pop on empty array"),
        (0x32, "array index out of bounds"),
        (0x41, "out of memory"),
        (0x51, "call to invalid function pointer"),
    ]);
}

/// Renders a call result as one line of text.
pub fn report(result: &CallResult) -> String {
    match result {
        CallResult::Success(SimulationResult { result, .. }) => {
            format!("0x{}", hex::encode(result))
        }
        CallResult::Failure(failure) => report_failure(failure),
    }
}

fn report_failure(failure: &SimulationFailure) -> String {
    match failure {
        SimulationFailure::Reverted { output, .. } => match revert_reason(output) {
            Some(reason) => format!("execution reverted: {reason}"),
            None => "execution reverted".to_string(),
        },
        SimulationFailure::OutOfGas { .. } => "out of gas".to_string(),
        SimulationFailure::Halted { reason, .. } => format!("execution halted: {reason}"),
        SimulationFailure::Rejected(reason) => format!("call rejected: {reason}"),
    }
}

/// Decodes a revert payload into readable text.
///
/// Solidity `Error(string)` yields the message, `Panic(uint256)` the panic name, anything else
/// non-empty is shown as hex. An empty payload has no reason.
pub fn revert_reason(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }
    if let Some(payload) = data.strip_prefix(&ERROR_SELECTOR) {
        if let Ok(message) = String::abi_decode(payload, true) {
            return Some(message);
        }
    } else if let Some(payload) = data.strip_prefix(&PANIC_SELECTOR) {
        if let Ok(code) = U256::abi_decode(payload, true) {
            let name = u64::try_from(code)
                .ok()
                .and_then(|code| SOLIDITY_PANIC_CODES.get(&code))
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("unknown panic code 0x{code:x}"));
            return Some(format!("panic: {name}"));
        }
    }
    Some(format!("0x{}", hex::encode(data)))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Bytes;
    use rstest::rstest;

    use super::*;

    fn error_payload(message: &str) -> Bytes {
        let mut data = ERROR_SELECTOR.to_vec();
        data.extend(message.to_string().abi_encode());
        data.into()
    }

    fn panic_payload(code: u64) -> Bytes {
        let mut data = PANIC_SELECTOR.to_vec();
        data.extend(U256::from(code).abi_encode());
        data.into()
    }

    fn reverted(output: Bytes) -> CallResult {
        CallResult::Failure(SimulationFailure::Reverted { output, gas_used: 0 })
    }

    #[rstest]
    #[case::empty(Bytes::new(), "0x")]
    #[case::word(Bytes::from_static(&[0x00, 0x2a]), "0x002a")]
    #[case::lowercase(Bytes::from_static(&[0xde, 0xad, 0xBE, 0xEF]), "0xdeadbeef")]
    fn test_success_is_hex(#[case] output: Bytes, #[case] expected: &str) {
        let result = CallResult::Success(SimulationResult { result: output, gas_used: 21 });

        assert_eq!(report(&result), expected);
    }

    #[rstest]
    #[case::bare(Bytes::new(), "execution reverted")]
    #[case::error_string(error_payload("nope"), "execution reverted: nope")]
    #[case::panic(panic_payload(0x11), "execution reverted: panic: arithmetic overflow or underflow")]
    #[case::unknown_panic(panic_payload(0x99), "execution reverted: panic: unknown panic code 0x99")]
    #[case::custom_error(Bytes::from_static(&[0x12, 0x34, 0x56, 0x78]), "execution reverted: 0x12345678")]
    fn test_revert_reasons(#[case] output: Bytes, #[case] expected: &str) {
        assert_eq!(report(&reverted(output)), expected);
    }

    #[test]
    fn test_malformed_error_payload_falls_back_to_hex() {
        let output = Bytes::from_static(&[0x08, 0xc3, 0x79, 0xa0, 0x01]);

        assert_eq!(report(&reverted(output)), "execution reverted: 0x08c379a001");
    }

    #[rstest]
    #[case::out_of_gas(SimulationFailure::OutOfGas { gas_used: 0 }, "out of gas")]
    #[case::halted(
        SimulationFailure::Halted { reason: "invalid opcode".to_string(), gas_used: 10 },
        "execution halted: invalid opcode"
    )]
    #[case::rejected(
        SimulationFailure::Rejected("caller has code".to_string()),
        "call rejected: caller has code"
    )]
    fn test_other_failures(#[case] failure: SimulationFailure, #[case] expected: &str) {
        assert_eq!(report(&CallResult::Failure(failure)), expected);
    }
}

//! Bridge contract ABI definition.
//!
//! Uses alloy's sol! macro to generate type-safe call and event bindings for
//! the source/destination bridge contracts (both chains share one interface).

use alloy::sol;

sol! {
    /// Bridge contract interface.
    ///
    /// The source chain emits `Deposit` when an asset is locked; the warden
    /// answers with `wrap` on the destination. The destination chain emits
    /// `Unwrap` when a wrapped asset is burned; the warden answers with
    /// `withdraw` on the source.
    contract Bridge {
        /// Mint the wrapped representation of a source-chain asset.
        function wrap(address token, address recipient, uint256 amount) external;

        /// Release a previously locked source-chain asset.
        function withdraw(address token, address recipient, uint256 amount) external;

        /// Emitted on the source chain when an asset is locked.
        event Deposit(
            address indexed token,
            address indexed recipient,
            uint256 amount
        );

        /// Emitted on the destination chain when a wrapped asset is burned.
        /// `underlying_token` is the source-chain asset to release, distinct
        /// from the wrapped representation that was burned.
        event Unwrap(
            address indexed underlying_token,
            address indexed wrapped_token,
            address to,
            uint256 amount
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, keccak256, U256};
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn test_event_signatures() {
        assert_eq!(
            Bridge::Deposit::SIGNATURE_HASH,
            keccak256(b"Deposit(address,address,uint256)")
        );
        assert_eq!(
            Bridge::Unwrap::SIGNATURE_HASH,
            keccak256(b"Unwrap(address,address,address,uint256)")
        );
    }

    #[test]
    fn test_wrap_call_round_trip() {
        let call = Bridge::wrapCall {
            token: address!("00000000000000000000000000000000000000aa"),
            recipient: address!("00000000000000000000000000000000000000bb"),
            amount: U256::from(100u64),
        };
        let encoded = call.abi_encode();
        let decoded = Bridge::wrapCall::abi_decode(&encoded, true).unwrap();
        assert_eq!(decoded.token, call.token);
        assert_eq!(decoded.recipient, call.recipient);
        assert_eq!(decoded.amount, call.amount);
    }
}

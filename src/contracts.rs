//! Centralized Contract Definitions
//!
//! Launchpad managers, the BEP20 surface and PancakeSwap V2, defined with
//! alloy's `sol!` macro. Event declarations double as the source of the
//! topic hashes used by the classifier (`SolEvent::SIGNATURE_HASH`).
//!
//! Created: 2026-10-19

use alloy::primitives::{address, Address};
use alloy::sol;

// ── BSC mainnet addresses ─────────────────────────────────────────────

/// Legacy launchpad manager
pub const TOKEN_MANAGER_V1: Address = address!("EC4549caDcE5DA21Df6E6422d448034B5233bFbC");
/// TokenManager2, BNB-settled launches
pub const TOKEN_MANAGER_V2: Address = address!("5c952063c7fc8610FFDB798152D69F0B9550762b");
/// TokenManagerHelper3, quote-settled launches and read helpers
pub const TOKEN_MANAGER_HELPER3: Address = address!("F251F83e40a78868FcfA3FA4599Dad6494E46034");

pub const WBNB: Address = address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");
pub const USD1: Address = address!("8d0D000Ee44948FC98c9B98A4FA4921476f08B0d");
pub const PANCAKE_FACTORY: Address = address!("cA143Ce32Fe78f1f7019d7d551a6402fC5350c73");
pub const PANCAKE_ROUTER: Address = address!("10ED43C718714eb63d5aA57B78B54704E256024E");

// ── BEP20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);

        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    interface IOwnable {
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
    }
}

// ── Launchpad managers ────────────────────────────────────────────────

sol! {
    /// Legacy manager. Only the event layout is known: token, account,
    /// amount, cost, fee.
    interface ITokenManager1 {
        event TokenPurchase(address token, address account, uint256 amount, uint256 cost, uint256 fee);
        event TokenSale(address token, address account, uint256 amount, uint256 cost, uint256 fee);
    }
}

sol! {
    #[sol(rpc)]
    interface ITokenManager2 {
        event TokenCreate(address creator, address token, uint256 requestId, string name, string symbol, uint256 totalSupply, uint256 launchTime, uint256 launchFee);
        event TokenPurchase(address token, address account, uint256 price, uint256 amount, uint256 cost, uint256 fee, uint256 offers, uint256 funds);
        event TokenSale(address token, address account, uint256 price, uint256 amount, uint256 cost, uint256 fee, uint256 offers, uint256 funds);

        function buyTokenAMAP(uint256 origin, address token, address to, uint256 funds, uint256 minAmount) external payable;
        function sellToken(uint256 origin, address token, uint256 amount, uint256 minFunds, uint256 feeRate, address feeRecipient) external;
    }
}

sol! {
    #[sol(rpc)]
    interface ITokenManagerHelper3 {
        function getTokenInfo(address token) external view returns (
            uint256 version,
            address tokenManager,
            address quote,
            uint256 lastPrice,
            uint256 tradingFeeRate,
            uint256 minTradingFee,
            uint256 launchTime,
            uint256 offers,
            uint256 maxOffers,
            uint256 funds,
            uint256 maxFunds,
            bool liquidityAdded
        );
        function tryBuy(address token, uint256 amount, uint256 funds) external view returns (
            address tokenManager,
            address quote,
            uint256 estimatedAmount,
            uint256 estimatedCost,
            uint256 estimatedFee,
            uint256 amountMsgValue,
            uint256 amountApproval,
            uint256 amountFunds
        );
        function trySell(address token, uint256 amount) external view returns (
            address tokenManager,
            address quote,
            uint256 funds,
            uint256 fee
        );
        function buyWithEth(uint256 origin, address token, address to, uint256 funds, uint256 minAmount) external payable;
        function sellForEth(uint256 origin, address token, address from, uint256 amount, uint256 minFunds, uint256 feeRate, address feeRecipient) external;
    }
}

// ── PancakeSwap V2 ────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IPancakeFactory {
        event PairCreated(address indexed token0, address indexed token1, address pair, uint256 index);

        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }
}

sol! {
    #[sol(rpc)]
    interface IPancakePair {
        event Mint(address indexed sender, uint256 amount0, uint256 amount1);
        event Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to);
        event Swap(address indexed sender, uint256 amount0In, uint256 amount1In, uint256 amount0Out, uint256 amount1Out, address indexed to);

        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    #[sol(rpc)]
    interface IPancakeRouter02 {
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
    }
}

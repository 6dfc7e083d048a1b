//! Building transaction intents from call parameters

use super::classify::ErrorTable;
use super::sender::{SubmissionOutcome, TransactionResubmitter};
use super::signer::TxSigner;
use super::types::{ControlParams, TransactionIntent};
use crate::chain::Ledger;
use crate::error::{SenderError, SenderResult};

use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{Abi, AbiParser, Function, ParamType, Token};
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::sync::Arc;
use tracing::debug;

/// Gas used by a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// What to send; unset fields are filled from the ledger
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
    pub data: Bytes,
}

/// Build an intent at the account's current nonce.
///
/// Gas price defaults to the ledger's suggestion. Gas limit defaults to
/// [`TRANSFER_GAS`] without payload, otherwise to the ledger's estimate.
pub async fn build_transfer<L>(ledger: &L, request: CallRequest) -> SenderResult<TransactionIntent>
where
    L: Ledger + ?Sized,
{
    let nonce = ledger
        .nonce_at(request.from)
        .await
        .map_err(SenderError::NonceQuery)?;

    let gas_price = match request.gas_price {
        Some(price) => price,
        None => ledger
            .suggest_gas_price()
            .await
            .map_err(SenderError::GasEstimation)?,
    };

    let gas = match request.gas {
        Some(gas) if !gas.is_zero() => gas,
        _ if request.data.is_empty() => U256::from(TRANSFER_GAS),
        _ => {
            let mut call = TransactionRequest::new()
                .from(request.from)
                .value(request.value)
                .gas_price(gas_price)
                .data(request.data.clone());
            if let Some(to) = request.to {
                call = call.to(to);
            }
            ledger
                .estimate_gas(&call)
                .await
                .map_err(SenderError::GasEstimation)?
        }
    };

    debug!(
        "Built transaction from {:?}: nonce {}, gas {}, gas price {}",
        request.from, nonce, gas, gas_price
    );

    Ok(TransactionIntent {
        from: request.from,
        to: request.to,
        value: request.value,
        gas,
        gas_price,
        nonce,
        data: request.data,
    })
}

/// A contract function that can encode its own call data
#[derive(Debug, Clone)]
pub struct ContractMethod {
    function: Function,
}

impl ContractMethod {
    /// Parse a human-readable signature, e.g. `transfer(address,uint256)`
    pub fn parse(signature: &str) -> SenderResult<Self> {
        AbiParser::default()
            .parse_function(signature)
            .map(|function| Self { function })
            .map_err(|e| SenderError::Abi(format!("Invalid method signature {}: {}", signature, e)))
    }

    /// Look up `name` in a JSON ABI
    pub fn from_abi_json(abi_json: &str, name: &str) -> SenderResult<Self> {
        let abi: Abi = serde_json::from_str(abi_json)
            .map_err(|e| SenderError::Abi(format!("Invalid ABI: {}", e)))?;
        let function = abi
            .function(name)
            .map_err(|e| SenderError::Abi(format!("{}: {}", name, e)))?
            .clone();
        Ok(Self { function })
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// ABI-encode a call from textual arguments
    pub fn encode(&self, args: &[String]) -> SenderResult<Bytes> {
        let inputs = &self.function.inputs;
        if inputs.len() != args.len() {
            return Err(SenderError::Abi(format!(
                "{} expects {} arguments, got {}",
                self.function.name,
                inputs.len(),
                args.len()
            )));
        }

        let tokens = inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| tokenize(&param.kind, arg))
            .collect::<SenderResult<Vec<Token>>>()?;

        self.function
            .encode_input(&tokens)
            .map(Bytes::from)
            .map_err(|e| SenderError::Abi(e.to_string()))
    }
}

fn tokenize(kind: &ParamType, arg: &str) -> SenderResult<Token> {
    let arg = match kind {
        ParamType::Address | ParamType::Bytes | ParamType::FixedBytes(_) => {
            arg.strip_prefix("0x").unwrap_or(arg)
        }
        _ => arg,
    };
    LenientTokenizer::tokenize(kind, arg)
        .map_err(|e| SenderError::Abi(format!("Cannot parse {:?} as {}: {}", arg, kind, e)))
}

/// Build an intent calling `method` on `request.to`
pub async fn build_contract_call<L>(
    ledger: &L,
    request: CallRequest,
    method: &ContractMethod,
    args: &[String],
) -> SenderResult<TransactionIntent>
where
    L: Ledger + ?Sized,
{
    let data = method.encode(args)?;
    build_transfer(ledger, CallRequest { data, ..request }).await
}

/// Sends calls to one contract from one signer
pub struct ContractTransactor {
    ledger: Arc<dyn Ledger>,
    resubmitter: TransactionResubmitter,
    address: Address,
    value: U256,
}

impl ContractTransactor {
    /// Bind `signer` to the contract at `address`, resolving the chain id
    pub async fn new(
        ledger: Arc<dyn Ledger>,
        signer: Arc<dyn TxSigner>,
        address: Address,
    ) -> SenderResult<Self> {
        let chain_id = ledger.chain_id().await.map_err(SenderError::ChainId)?;
        let resubmitter = TransactionResubmitter::new(ledger.clone(), signer, chain_id);
        Ok(Self {
            ledger,
            resubmitter,
            address,
            value: U256::zero(),
        })
    }

    pub fn with_error_table(mut self, errors: ErrorTable) -> Self {
        self.resubmitter = self.resubmitter.with_error_table(errors);
        self
    }

    /// Wei attached to every call, zero by default
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Intent for calling `method` with `args`
    pub async fn build(&self, method: &ContractMethod, args: &[String]) -> SenderResult<TransactionIntent> {
        let request = CallRequest {
            from: self.resubmitter.account(),
            to: Some(self.address),
            value: self.value,
            ..Default::default()
        };
        build_contract_call(self.ledger.as_ref(), request, method, args).await
    }

    /// Build, sign and drive a call to confirmation
    pub async fn transact_with_receipt(
        &self,
        params: &ControlParams,
        method: &ContractMethod,
        args: &[String],
    ) -> SubmissionOutcome {
        match self.build(method, args).await {
            Ok(tx) => self.resubmitter.transact_with_receipt(params, tx).await,
            Err(error) => SubmissionOutcome::Failed {
                signed: None,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockLedger;
    use crate::error::LedgerError;
    use crate::tx::signer::MockTxSigner;
    use crate::tx::types::SignedTransaction;
    use ethers::types::{Signature, TransactionReceipt, H256};
    use std::sync::Mutex;
    use std::time::Duration;

    const ERC20_TRANSFER_ABI: &str = r#"[{"inputs":[{"internalType":"address","name":"recipient","type":"address"},{"internalType":"uint256","name":"amount","type":"uint256"}],"name":"transfer","outputs":[{"internalType":"bool","name":"","type":"bool"}],"stateMutability":"nonpayable","type":"function"}]"#;

    fn sender() -> Address {
        Address::repeat_byte(0x01)
    }

    fn token() -> Address {
        Address::repeat_byte(0x02)
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_plain_transfer_uses_fixed_gas_and_market_price() {
        let mut ledger = MockLedger::new();
        ledger.expect_nonce_at().times(1).returning(|_| Ok(12));
        ledger
            .expect_suggest_gas_price()
            .times(1)
            .returning(|| Ok(U256::from(2_000_000_000u64)));
        ledger.expect_estimate_gas().times(0);

        let request = CallRequest {
            from: sender(),
            to: Some(sender()),
            value: U256::from(1u64),
            ..Default::default()
        };
        let tx = build_transfer(&ledger, request).await.unwrap();

        assert_eq!(tx.nonce, 12);
        assert_eq!(tx.gas, U256::from(TRANSFER_GAS));
        assert_eq!(tx.gas_price, U256::from(2_000_000_000u64));
        assert_eq!(tx.to, Some(sender()));
    }

    #[tokio::test]
    async fn test_payload_is_estimated_and_explicit_price_kept() {
        let mut ledger = MockLedger::new();
        ledger.expect_nonce_at().returning(|_| Ok(0));
        ledger.expect_suggest_gas_price().times(0);
        ledger
            .expect_estimate_gas()
            .withf(|call| call.data.as_ref().map(|d| d.len()) == Some(4))
            .times(1)
            .returning(|_| Ok(U256::from(45_000u64)));

        let request = CallRequest {
            from: sender(),
            to: Some(token()),
            gas_price: Some(U256::from(7u64)),
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            ..Default::default()
        };
        let tx = build_transfer(&ledger, request).await.unwrap();

        assert_eq!(tx.gas, U256::from(45_000u64));
        assert_eq!(tx.gas_price, U256::from(7u64));
    }

    #[tokio::test]
    async fn test_nonce_failure_is_reported() {
        let mut ledger = MockLedger::new();
        ledger
            .expect_nonce_at()
            .returning(|_| Err(LedgerError::new("connection refused")));

        let result = build_transfer(&ledger, CallRequest::default()).await;
        assert!(matches!(result, Err(SenderError::NonceQuery(_))));
    }

    #[test]
    fn test_encode_erc20_transfer() {
        let method = ContractMethod::parse("transfer(address,uint256)").unwrap();
        let data = method
            .encode(&args(&["0x0202020202020202020202020202020202020202", "1000"]))
            .unwrap();

        assert_eq!(method.name(), "transfer");
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 32 * 2);
        assert_eq!(&data[16..36], token().as_bytes());
        assert_eq!(U256::from_big_endian(&data[36..68]), U256::from(1000u64));
    }

    #[test]
    fn test_abi_json_matches_signature() {
        let from_json = ContractMethod::from_abi_json(ERC20_TRANSFER_ABI, "transfer").unwrap();
        let parsed = ContractMethod::parse("function transfer(address,uint256)").unwrap();
        let call = args(&["0202020202020202020202020202020202020202", "5"]);

        assert_eq!(from_json.encode(&call).unwrap(), parsed.encode(&call).unwrap());
        assert!(ContractMethod::from_abi_json(ERC20_TRANSFER_ABI, "approve").is_err());
    }

    #[test]
    fn test_encode_rejects_bad_arguments() {
        let method = ContractMethod::parse("transfer(address,uint256)").unwrap();
        assert!(method.encode(&args(&["0x01"])).is_err());
        assert!(method.encode(&args(&["not-an-address", "1"])).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transactor_sends_encoded_call() {
        let mut ledger = MockLedger::new();
        ledger.expect_chain_id().times(1).returning(|| Ok(31337));
        let mut nonces = vec![Ok(4), Ok(5)].into_iter();
        ledger
            .expect_nonce_at()
            .returning(move |_| nonces.next().unwrap_or(Ok(5)));
        ledger
            .expect_suggest_gas_price()
            .returning(|| Ok(U256::from(100u64)));
        ledger
            .expect_estimate_gas()
            .returning(|_| Ok(U256::from(51_000u64)));
        ledger
            .expect_send_raw_transaction()
            .times(1)
            .returning(|_| Ok(()));
        ledger
            .expect_transaction_receipt()
            .returning(|_| Ok(TransactionReceipt::default()));

        let sent: Arc<Mutex<Vec<TransactionIntent>>> = Arc::new(Mutex::new(Vec::new()));
        let log = sent.clone();
        let mut signer = MockTxSigner::new();
        signer.expect_account().return_const(sender());
        signer.expect_sign().returning(move |tx, _| {
            log.lock().unwrap().push(tx.clone());
            Ok(SignedTransaction {
                intent: tx.clone(),
                signature: Signature {
                    r: U256::one(),
                    s: U256::one(),
                    v: 27,
                },
                raw: Bytes::from(vec![0x01]),
                hash: H256::repeat_byte(0x33),
            })
        });

        let transactor = ContractTransactor::new(Arc::new(ledger), Arc::new(signer), token())
            .await
            .unwrap();
        let method = ContractMethod::parse("transfer(address,uint256)").unwrap();
        let params = ControlParams {
            polling_interval: Duration::from_millis(100),
            ..Default::default()
        };
        let outcome = transactor
            .transact_with_receipt(
                &params,
                &method,
                &args(&["0x0101010101010101010101010101010101010101", "0"]),
            )
            .await;

        assert!(outcome.is_confirmed());
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, Some(token()));
        assert_eq!(sent[0].nonce, 4);
        assert_eq!(sent[0].gas, U256::from(51_000u64));
        assert_eq!(&sent[0].data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[tokio::test]
    async fn test_transactor_attaches_value() {
        let mut ledger = MockLedger::new();
        ledger.expect_chain_id().returning(|| Ok(1));
        ledger.expect_nonce_at().returning(|_| Ok(9));
        ledger
            .expect_suggest_gas_price()
            .returning(|| Ok(U256::from(100u64)));
        ledger
            .expect_estimate_gas()
            .withf(|call| call.value == Some(U256::from(250u64)))
            .returning(|_| Ok(U256::from(30_000u64)));
        let mut signer = MockTxSigner::new();
        signer.expect_account().return_const(sender());

        let transactor = ContractTransactor::new(Arc::new(ledger), Arc::new(signer), token())
            .await
            .unwrap()
            .with_value(U256::from(250u64));
        let method = ContractMethod::parse("deposit()").unwrap();
        let tx = transactor.build(&method, &[]).await.unwrap();

        assert_eq!(tx.value, U256::from(250u64));
        assert_eq!(tx.from, sender());
        assert_eq!(tx.nonce, 9);
        assert_eq!(tx.data.len(), 4);
    }

    #[tokio::test]
    async fn test_transactor_reports_build_failure() {
        let mut ledger = MockLedger::new();
        ledger.expect_chain_id().returning(|| Ok(1));
        let mut signer = MockTxSigner::new();
        signer.expect_account().return_const(sender());
        signer.expect_sign().times(0);

        let transactor = ContractTransactor::new(Arc::new(ledger), Arc::new(signer), token())
            .await
            .unwrap();
        let method = ContractMethod::parse("transfer(address,uint256)").unwrap();
        let outcome = transactor
            .transact_with_receipt(&ControlParams::default(), &method, &args(&["1"]))
            .await;

        assert!(matches!(
            outcome,
            SubmissionOutcome::Failed {
                signed: None,
                error: SenderError::Abi(_)
            }
        ));
    }
}

use std::ops::Deref;

use cc_link::actions::{action_bool, action_int, execute_checked};
use cc_link::{Client, Context, RpcError, Value};
use tracing::debug;

use crate::block::Block;
use crate::computer::Computer;
use crate::item::ItemDetail;
use crate::side::Direction;

/// A mining/crafting robot. Everything a [`Computer`] does is reachable through deref.
#[derive(Debug, Clone)]
pub struct Turtle {
    computer: Computer,
}

impl Deref for Turtle {
    type Target = Computer;

    fn deref(&self) -> &Self::Target {
        &self.computer
    }
}

impl From<Client> for Turtle {
    fn from(client: Client) -> Self {
        Self::new(client)
    }
}

impl Turtle {
    pub fn new(client: Client) -> Self {
        Self {
            computer: Computer::new(client),
        }
    }

    async fn act(&self, cx: &Context, command: &str) -> Result<bool, RpcError> {
        action_bool(cx, self.conn().as_ref(), command).await
    }

    async fn count(&self, cx: &Context, command: &str) -> Result<i64, RpcError> {
        action_int(cx, self.conn().as_ref(), command).await
    }

    pub async fn forward(&self, cx: &Context) -> Result<bool, RpcError> {
        self.act(cx, "turtle.forward()").await
    }

    pub async fn back(&self, cx: &Context) -> Result<bool, RpcError> {
        self.act(cx, "turtle.back()").await
    }

    pub async fn up(&self, cx: &Context) -> Result<bool, RpcError> {
        self.act(cx, "turtle.up()").await
    }

    pub async fn down(&self, cx: &Context) -> Result<bool, RpcError> {
        self.act(cx, "turtle.down()").await
    }

    pub async fn turn_left(&self, cx: &Context) -> Result<bool, RpcError> {
        self.act(cx, "turtle.turnLeft()").await
    }

    pub async fn turn_right(&self, cx: &Context) -> Result<bool, RpcError> {
        self.act(cx, "turtle.turnRight()").await
    }

    pub async fn dig(&self, cx: &Context, direction: Direction) -> Result<bool, RpcError> {
        self.act(cx, &format!("{}()", direction.command("dig"))).await
    }

    pub async fn place(&self, cx: &Context, direction: Direction) -> Result<bool, RpcError> {
        self.act(cx, &format!("{}()", direction.command("place"))).await
    }

    /// Whether a solid block is there. Any failure reads as `false`.
    pub async fn detect(&self, cx: &Context, direction: Direction) -> bool {
        let command = format!("{}()", direction.command("detect"));
        match self.conn().execute(cx, &command).await {
            Ok(response) => matches!(response.get(0), Some(Value::Bool(true))),
            Err(err) => {
                debug!(device_key = %self.client().key(), error = %err, "detect failed");
                false
            }
        }
    }

    /// Whether the block there matches the selected item.
    pub async fn compare(&self, cx: &Context, direction: Direction) -> Result<bool, RpcError> {
        self.act(cx, &format!("{}()", direction.command("compare"))).await
    }

    pub async fn attack(&self, cx: &Context, direction: Direction) -> Result<bool, RpcError> {
        self.act(cx, &format!("{}()", direction.command("attack"))).await
    }

    /// Drops up to `count` items of the selected stack.
    pub async fn drop(&self, cx: &Context, direction: Direction, count: u32) -> Result<bool, RpcError> {
        self.act(cx, &format!("{}({count})", direction.command("drop"))).await
    }

    pub async fn suck(&self, cx: &Context, direction: Direction, count: u32) -> Result<bool, RpcError> {
        self.act(cx, &format!("{}({count})", direction.command("suck"))).await
    }

    /// Slots are numbered 1 to 16.
    pub async fn select(&self, cx: &Context, slot: u8) -> Result<bool, RpcError> {
        self.act(cx, &format!("turtle.select({slot})")).await
    }

    pub async fn selected_slot(&self, cx: &Context) -> Result<i64, RpcError> {
        self.count(cx, "turtle.getSelectedSlot()").await
    }

    pub async fn item_count(&self, cx: &Context, slot: u8) -> Result<i64, RpcError> {
        self.count(cx, &format!("turtle.getItemCount({slot})")).await
    }

    pub async fn item_space(&self, cx: &Context, slot: u8) -> Result<i64, RpcError> {
        self.count(cx, &format!("turtle.getItemSpace({slot})")).await
    }

    /// `None` for an empty slot. `detailed` asks for the slower, richer read.
    pub async fn item_detail(
        &self,
        cx: &Context,
        slot: u8,
        detailed: bool,
    ) -> Result<Option<ItemDetail>, RpcError> {
        let command = format!("turtle.getItemDetail({slot}, {detailed})");
        let response = execute_checked(cx, self.conn().as_ref(), &command).await?;
        match response.get(0) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => Ok(Some(ItemDetail::new(response.table_at(0)?.clone()))),
        }
    }

    pub async fn compare_to(&self, cx: &Context, slot: u8) -> Result<bool, RpcError> {
        self.act(cx, &format!("turtle.compareTo({slot})")).await
    }

    pub async fn transfer_to(&self, cx: &Context, slot: u8, count: u32) -> Result<bool, RpcError> {
        self.act(cx, &format!("turtle.transferTo({slot},{count})")).await
    }

    /// `None` when fuel is disabled on the server and the turtle reports `"unlimited"`.
    pub async fn fuel_level(&self, cx: &Context) -> Result<Option<i64>, RpcError> {
        self.fuel(cx, "turtle.getFuelLevel()").await
    }

    pub async fn fuel_limit(&self, cx: &Context) -> Result<Option<i64>, RpcError> {
        self.fuel(cx, "turtle.getFuelLimit()").await
    }

    async fn fuel(&self, cx: &Context, command: &str) -> Result<Option<i64>, RpcError> {
        let response = execute_checked(cx, self.conn().as_ref(), command).await?;
        match response.value_at(0)? {
            Value::String(text) if text == "unlimited" => Ok(None),
            _ => response.int_at(0).map(Some),
        }
    }

    pub async fn refuel(&self, cx: &Context, count: u32) -> Result<bool, RpcError> {
        self.act(cx, &format!("turtle.refuel({count})")).await
    }

    pub async fn craft(&self, cx: &Context, limit: u32) -> Result<bool, RpcError> {
        self.act(cx, &format!("turtle.craft({limit})")).await
    }

    /// Looks at the block there. `(false, None)` when there is nothing to inspect.
    pub async fn inspect(
        &self,
        cx: &Context,
        direction: Direction,
    ) -> Result<(bool, Option<Block>), RpcError> {
        let command = format!("{}()", direction.command("inspect"));
        let response = self.conn().execute(cx, &command).await?;
        if !response.bool_at(0)? {
            return Ok((false, None));
        }
        let block = response.table_at(1)?.clone();
        Ok((true, Some(Block::new(block))))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::FakeDevice;

    async fn turtle() -> (Turtle, FakeDevice) {
        let device = FakeDevice::spawn(|command| match command {
            "turtle.forward()" | "turtle.digUp()" | "turtle.detect()" => json!([true]),
            "turtle.up()" => json!([false, "Movement obstructed"]),
            "turtle.detectDown()" => json!([null, "???"]),
            "turtle.getSelectedSlot()" => json!([3]),
            "turtle.getItemCount(3)" => json!([64]),
            "turtle.getFuelLevel()" => json!([1200]),
            "turtle.getFuelLimit()" => json!(["unlimited"]),
            "turtle.inspect()" => json!([true, {
                "name": "minecraft:oak_log",
                "state": {"axis": "y"},
                "tags": {"minecraft:logs": true}
            }]),
            "turtle.inspectUp()" => json!([false, "No block to inspect"]),
            "turtle.getItemDetail(1, false)" => json!([{"name": "minecraft:coal", "count": 12}]),
            "turtle.getItemDetail(1, true)" => json!([{
                "name": "minecraft:coal",
                "count": 12,
                "displayName": "Coal",
                "tags": {"minecraft:coals": true}
            }]),
            "turtle.getItemDetail(2, false)" => json!([]),
            _ => json!([true]),
        })
        .await;
        (Turtle::new(device.client.clone()), device)
    }

    #[test_timeout::tokio_timeout_test]
    async fn movement_reports_obstruction() {
        let (turtle, _device) = turtle().await;
        let cx = Context::background();
        assert!(turtle.forward(&cx).await.expect("forward"));
        let err = turtle.up(&cx).await.expect_err("obstructed");
        assert!(matches!(err, RpcError::Remote(reason) if reason == "Movement obstructed"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn directional_commands() {
        let (turtle, device) = turtle().await;
        let cx = Context::background();
        assert!(turtle.dig(&cx, Direction::Up).await.expect("dig"));
        assert!(turtle.drop(&cx, Direction::Down, 16).await.expect("drop"));
        assert_eq!(device.last_command().as_deref(), Some("turtle.dropDown(16)"));
        assert!(turtle.suck(&cx, Direction::Front, 1).await.expect("suck"));
        assert_eq!(device.last_command().as_deref(), Some("turtle.suck(1)"));
        assert!(turtle.detect(&cx, Direction::Front).await);
        assert!(!turtle.detect(&cx, Direction::Down).await);
    }

    #[test_timeout::tokio_timeout_test]
    async fn inventory_and_fuel() {
        let (turtle, device) = turtle().await;
        let cx = Context::background();
        assert_eq!(turtle.selected_slot(&cx).await.expect("slot"), 3);
        assert_eq!(turtle.item_count(&cx, 3).await.expect("count"), 64);
        assert!(turtle.transfer_to(&cx, 5, 10).await.expect("transfer"));
        assert_eq!(device.last_command().as_deref(), Some("turtle.transferTo(5,10)"));
        assert_eq!(turtle.fuel_level(&cx).await.expect("fuel"), Some(1200));
        assert_eq!(turtle.fuel_limit(&cx).await.expect("limit"), None);
    }

    #[test_timeout::tokio_timeout_test]
    async fn item_details() {
        let (turtle, _device) = turtle().await;
        let cx = Context::background();
        let coal = turtle.item_detail(&cx, 1, false).await.expect("detail").expect("item");
        assert_eq!(coal.name(), "minecraft:coal");
        assert_eq!(coal.count(), 12);
        assert_eq!(coal.display_name(), None);
        assert_eq!(coal.to_string(), "12xminecraft:coal");

        let detailed = turtle.item_detail(&cx, 1, true).await.expect("detail").expect("item");
        assert_eq!(detailed.display_name(), Some("Coal"));
        assert!(detailed.has_tag("minecraft:coals"));

        assert_eq!(turtle.item_detail(&cx, 2, false).await.expect("empty"), None);
    }

    #[test_timeout::tokio_timeout_test]
    async fn inspect_returns_block_or_nothing() {
        let (turtle, _device) = turtle().await;
        let cx = Context::background();
        let (found, block) = turtle.inspect(&cx, Direction::Front).await.expect("inspect");
        assert!(found);
        let block = block.expect("block");
        assert_eq!(block.name(), "minecraft:oak_log");
        assert!(block.contains_tag("minecraft:logs"));
        assert_eq!(block.age(), -1);

        assert_eq!(
            turtle.inspect(&cx, Direction::Up).await.expect("inspect up"),
            (false, None)
        );
    }

    #[test_timeout::tokio_timeout_test]
    async fn computer_commands_through_deref() {
        let (turtle, device) = turtle().await;
        turtle.reboot(&Context::background()).await.expect("reboot");
        assert_eq!(device.last_command().as_deref(), Some("os.reboot()"));
    }
}

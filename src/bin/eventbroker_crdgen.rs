use kube::CustomResourceExt;

use pubsubplus_operator::resources::eventbrokers::EventBroker;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&EventBroker::crd())?);
    Ok(())
}

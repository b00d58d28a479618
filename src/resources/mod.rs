pub mod eventbrokers;
